// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

use sqlx::FromRow;

/// The built artifact of a build job for one architecture. Associated with
/// exactly one build [`Job`](crate::model::Job) via `build_job_id`.
#[derive(Clone, Debug, FromRow)]
pub struct Binary {
    pub id: i64,
    pub source_id: i64,
    pub arch_id: i64,
    pub build_job_id: i64,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

/// One `.deb`/`.udeb` file belonging to a [`Binary`], recorded with the
/// pool directory it was filed into (which may differ from the source's
/// own directory when the upload's `section` remaps the component).
#[derive(Clone, Debug, FromRow)]
pub struct Deb {
    pub id: i64,
    pub binary_id: i64,
    pub directory: String,
    pub filename: String,
}

/// Derive the pool directory a file should be filed into, given the
/// source's own directory and the upload's declared `section`. A section
/// of the form `<component>/<section>` remaps the component segment of the
/// pool path; a bare section leaves the directory untouched.
pub fn pool_directory_for_section(source_directory: &str, section: &str) -> String {
    let Some((component, _)) = section.split_once('/') else {
        return source_directory.to_string();
    };
    match source_directory.find("/pool/") {
        Some(pool_at) => {
            let prefix = &source_directory[..pool_at];
            let rest = &source_directory[pool_at + "/pool/".len()..];
            let after_component = rest.split_once('/').map(|(_, r)| r).unwrap_or("");
            format!("{prefix}/pool/{component}/{after_component}")
        }
        None => source_directory.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_section_leaves_directory_unchanged() {
        assert_eq!(
            pool_directory_for_section("/srv/repo/pool/main/h/hello", "optional"),
            "/srv/repo/pool/main/h/hello"
        );
    }

    #[test]
    fn section_with_component_remaps_pool_directory() {
        assert_eq!(
            pool_directory_for_section("/srv/repo/pool/main/h/hello", "contrib/misc"),
            "/srv/repo/pool/contrib/h/hello"
        );
    }
}
