// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Human uploaders and worker machines. Both are "Principal"s in the sense
//! of spec.md §3: they carry a signing fingerprint (used to authenticate
//! uploads) and a transport fingerprint (used to authenticate RPC
//! connections), and are disabled by overwriting both with a sentinel that
//! cannot match any real certificate.

use sqlx::FromRow;

/// Fingerprint value written to a disabled principal. Not a valid hex
/// fingerprint of any real key, so it can never be matched by signature or
/// TLS peer-certificate lookup.
pub const DISABLED_SENTINEL: &str = "disabled";

pub trait Principal {
    fn id(&self) -> i64;
    fn signing_fingerprint(&self) -> &str;
    fn transport_fingerprint(&self) -> &str;
    fn is_disabled(&self) -> bool {
        self.signing_fingerprint() == DISABLED_SENTINEL
            && self.transport_fingerprint() == DISABLED_SENTINEL
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub signing_fingerprint: String,
    pub transport_fingerprint: String,
}

impl Principal for Person {
    fn id(&self) -> i64 {
        self.id
    }
    fn signing_fingerprint(&self) -> &str {
        &self.signing_fingerprint
    }
    fn transport_fingerprint(&self) -> &str {
        &self.transport_fingerprint
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct Builder {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub signing_fingerprint: String,
    pub transport_fingerprint: String,
    pub last_ping: Option<chrono::DateTime<chrono::Utc>>,
}

impl Principal for Builder {
    fn id(&self) -> i64 {
        self.id
    }
    fn signing_fingerprint(&self) -> &str {
        &self.signing_fingerprint
    }
    fn transport_fingerprint(&self) -> &str {
        &self.transport_fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_sets_both_fingerprints_to_the_sentinel() {
        let disabled = Person {
            id: 1,
            name: "Jane Maintainer".into(),
            email: "jane@example.org".into(),
            signing_fingerprint: DISABLED_SENTINEL.into(),
            transport_fingerprint: DISABLED_SENTINEL.into(),
        };
        assert!(disabled.is_disabled());

        let active = Person {
            signing_fingerprint: "ABCDEF0123456789".into(),
            transport_fingerprint: "0123456789ABCDEF".into(),
            ..disabled
        };
        assert!(!active.is_disabled());
    }
}
