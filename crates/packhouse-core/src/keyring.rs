// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Keyring import/cleanup, per spec.md §4.6. Grounded on
//! `examples/original_source/debile/master/keyrings.py`, reworked to use the
//! `deb` crate's OpenPGP support for the signing keyring and an `openssl`
//! subprocess for the transport (X.509) keyring, each guarded by an
//! exclusive advisory lock on the keyring file (spec.md §5).

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use fs2::FileExt;
use sequoia_openpgp::parse::Parse;
use sequoia_openpgp::Cert;

use crate::{Error, Result};

/// Import a signing public key into the keyring, returning its fingerprint.
/// `keydata` is the armored or binary OpenPGP public key material. The
/// keyring itself stays a flat file of concatenated certs, read back by
/// [`deb::control::openpgp::OpenPgpValidatorBuilder::with_keyring`] at
/// verification time, so importing here is just "does this parse as a cert,
/// and if so append it".
pub async fn import_signing(keyring: &Path, keydata: &[u8]) -> Result<String> {
    let cert = Cert::from_bytes(keydata)
        .map_err(|_| Error::String("failed to parse OpenPGP public key".to_string()))?;
    let fingerprint = cert.fingerprint().to_hex();

    let keyring = keyring.to_path_buf();
    let keydata = keydata.to_vec();
    tokio::task::spawn_blocking(move || append_locked(&keyring, &keydata)).await??;

    Ok(fingerprint)
}

/// Import a PEM-formatted transport certificate into the keyring, returning
/// its SHA-1 fingerprint. When `cn`/`email` are given, the certificate's
/// subject must contain matching values, since a transport keyring that
/// holds multiple certificates with the same subject breaks TLS client
/// verification.
pub async fn import_transport(
    keyring: &Path,
    certdata: &[u8],
    cn: Option<&str>,
    email: Option<&str>,
) -> Result<String> {
    let (fingerprint, subject) = parse_x509_fingerprint_and_subject(certdata)?;

    if let Some(cn) = cn {
        if !subject.contains(&format!("CN={cn}")) {
            return Err(Error::String(format!(
                "transport certificate subject does not contain CN={cn}"
            )));
        }
    }
    if let Some(email) = email {
        if !subject.iter().any(|s| s.contains(email)) {
            return Err(Error::String(format!(
                "transport certificate subject does not contain emailAddress={email}"
            )));
        }
    }

    let keyring = keyring.to_path_buf();
    let certdata = certdata.to_vec();
    tokio::task::spawn_blocking(move || append_locked(&keyring, &certdata)).await??;

    Ok(fingerprint)
}

/// Remove any certificate from the transport keyring whose fingerprint no
/// longer corresponds to an enabled principal.
pub fn cleanup_transport(keyring: &Path, still_valid: &dyn Fn(&str) -> bool) -> Result<()> {
    let mut file = OpenOptions::new().read(true).open(keyring)?;
    file.lock_exclusive()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let mut kept = String::new();
    let mut block = String::new();
    let mut in_block = false;
    for line in contents.lines() {
        if line.contains("-BEGIN CERTIFICATE-") {
            in_block = true;
            block.clear();
        }
        if in_block {
            block.push_str(line);
            block.push('\n');
        }
        if line.contains("-END CERTIFICATE-") {
            in_block = false;
            if let Ok((fingerprint, _)) = parse_x509_fingerprint_and_subject(block.as_bytes()) {
                if still_valid(&fingerprint) {
                    kept.push_str(&block);
                }
            }
        }
    }

    let tmp = keyring.with_extension("tmp");
    std::fs::write(&tmp, kept)?;
    std::fs::rename(tmp, keyring)?;
    Ok(())
}

fn append_locked(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    file.write_all(data)?;
    FileExt::unlock(&file)?;
    Ok(())
}

/// Shells out to `openssl x509` to extract a certificate's SHA-1
/// fingerprint and subject, mirroring the original system's reliance on
/// the `openssl` CLI rather than re-implementing X.509 parsing.
fn parse_x509_fingerprint_and_subject(certdata: &[u8]) -> Result<(String, Vec<String>)> {
    use std::process::{Command, Stdio};

    let mut child = Command::new("openssl")
        .args(["x509", "-noout", "-inform", "pem", "-sha1", "-fingerprint", "-subject"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(certdata)?;
    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(Error::String("openssl failed to parse certificate".to_string()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut fingerprint = None;
    let mut subject = Vec::new();
    for line in stdout.lines() {
        if let Some(value) = line.strip_prefix("SHA1 Fingerprint=") {
            fingerprint = Some(value.replace(':', ""));
        } else if let Some(value) = line.strip_prefix("subject=") {
            subject = value.split('/').map(|s| s.trim().to_string()).collect();
        }
    }
    let fingerprint =
        fingerprint.ok_or_else(|| Error::String("openssl produced no fingerprint".to_string()))?;
    Ok((fingerprint, subject))
}
