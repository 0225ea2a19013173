// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

use sqlx::FromRow;

/// The outcome of a diagnostic bundle ingest (spec.md glossary: "Result").
/// Named `CheckResult` here to avoid shadowing [`std::result::Result`].
#[derive(Clone, Debug, FromRow)]
pub struct CheckResult {
    pub id: i64,
    pub job_id: i64,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
    pub failed: bool,
    pub firehose_id: Option<String>,
    pub directory: String,
}

/// `<src>_<ver>/<check>_<arch>/<result_id>`, per spec.md §3.
pub fn result_directory(source_name: &str, source_version: &str, check: &str, arch: &str, result_id: i64) -> String {
    format!("{source_name}_{source_version}/{check}_{arch}/{result_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_the_conventional_directory_layout() {
        assert_eq!(
            result_directory("hello", "2.10-3", "lintian", "amd64", 42),
            "hello_2.10-3/lintian_amd64/42"
        );
    }
}
