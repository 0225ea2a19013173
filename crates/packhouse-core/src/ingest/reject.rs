// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! The closed set of rejection tags, per spec.md §7. These strings are part
//! of the external contract (logged and put on the event bus verbatim), so
//! they are kept exactly as `examples/original_source/debile/master/incoming*.py`
//! spells them — including `dsc-does-not-march-changes`, which reads like a
//! typo for "match" but is not ours to fix.

use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum RejectTag {
    // upload-shape
    InvalidUpload,
    MixedUpload,
    MultiArchUpload,
    NoArchitecture,
    NoJob,
    MissingDudJob,
    InvalidDudUpload,
    #[strum(serialize = "dsc-does-not-march-changes")]
    DscDoesNotMarchChanges,

    // auth
    InvalidSignature,
    InvalidUser,
    InvalidBuilder,
    InvalidDudBuilder,
    InvalidDudUploader,
    WrongBuilder,

    // consistency
    InvalidGroup,
    InvalidSuiteForGroup,
    SourceAlreadyInGroup,
    NewerSourceAlreadyInSuite,
    BinarySourceNameMismatch,
    BinarySourceVersionMismatch,
    BinarySourceGroupMismatch,
    BinarySourceSuiteMismatch,
    WrongArchitecture,
    BadArchitectureOfFile,

    // infrastructure
    InternalError,
    #[strum(serialize = "stupid-source-thing")]
    StupidSourceThing,
    DudFilesAlreadyRegistered,
    NoFailureNotice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_match_the_original_contract() {
        assert_eq!(RejectTag::InvalidUpload.to_string(), "invalid-upload");
        assert_eq!(
            RejectTag::DscDoesNotMarchChanges.to_string(),
            "dsc-does-not-march-changes"
        );
        assert_eq!(
            RejectTag::StupidSourceThing.to_string(),
            "stupid-source-thing"
        );
        assert_eq!(
            RejectTag::BinarySourceNameMismatch.to_string(),
            "binary-source-name-mismatch"
        );
    }
}
