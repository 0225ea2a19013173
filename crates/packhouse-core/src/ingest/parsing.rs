// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Thin wrappers around `deb::control` for the two things every upload kind
//! needs: verifying the clear-signature against the signing keyring, and
//! reading the packhouse-specific `X-Debile-*` extension headers that the
//! `deb` crate's typed `Changes`/`Dsc` structs don't know about.

use std::path::Path;

use deb::control::{de, RawParagraph};

use crate::ingest::RejectTag;
use crate::Error;

/// The clear-signed text, verified against `keyring`, plus the signer's
/// fingerprint (the first valid signature) and the raw field table for
/// extension headers.
pub struct VerifiedControl {
    pub signer_fingerprint: String,
    pub content: String,
    pub raw: RawParagraph,
}

/// Verify `raw_bytes` as a clear-signed control document against `keyring`
/// and parse its fields. Any failure (bad signature, unparseable control
/// syntax) is reported as [`RejectTag::InvalidSignature`] or
/// [`RejectTag::InvalidUpload`] respectively, per spec.md §7.
pub fn verify_and_parse(keyring: &Path, raw_bytes: &[u8]) -> crate::Result<VerifiedControl> {
    let validator = deb::control::OpenPgpValidator::build()
        .with_keyring(keyring)
        .build()
        .map_err(|e| Error::String(format!("failed to load signing keyring: {e:?}")))?;

    let (signatures, content) = validator
        .validate(raw_bytes)
        .map_err(|_| Error::Rejected(RejectTag::InvalidSignature))?;

    let signer_fingerprint = signatures
        .first()
        .map(|(cert, _sig)| cert.fingerprint().to_hex())
        .ok_or(Error::Rejected(RejectTag::InvalidSignature))?;

    let mut content_str = String::new();
    {
        use std::io::Read;
        let mut content = content;
        content
            .read_to_string(&mut content_str)
            .map_err(|_| Error::Rejected(RejectTag::InvalidUpload))?;
    }

    let raw = RawParagraph::parse(content_str.trim_start())
        .map_err(|_| Error::Rejected(RejectTag::InvalidUpload))?;

    Ok(VerifiedControl {
        signer_fingerprint,
        content: content_str,
        raw,
    })
}

/// Decode the signed content into a typed `deb::control` struct (`Changes`
/// or `Dsc`), surfacing any shape error as [`RejectTag::InvalidUpload`].
pub fn parse_typed<'a, T>(content: &'a str) -> crate::Result<T>
where
    T: serde::de::Deserialize<'a>,
{
    de::from_str(content).map_err(|_| Error::Rejected(RejectTag::InvalidUpload))
}

/// First value of a single-valued extension header, e.g. `X-Debile-Group`.
pub fn field(raw: &RawParagraph, name: &str) -> Option<String> {
    raw.field(name).next().map(|f| f.value.trim().to_string())
}
