// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use config::{Config as ConfigBase, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::Result;

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

/// How a [`Group`](crate::model::Group) resolves to a repository and file
/// area. Either a set of templates with `{name}`/`{id}` placeholders, or the
/// name of a pluggable resolver registered by the embedding application.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ArchiveResolver {
    Templated(TemplatedResolver),
    Named { resolver: String },
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TemplatedResolver {
    pub repo_path: String,
    pub repo_url: String,
    pub files_path: String,
    pub files_url: String,
}

impl TemplatedResolver {
    pub fn resolve(&self, name: &str, id: i64) -> ResolvedGroupPaths {
        let sub = |tmpl: &str| {
            tmpl.replace("{name}", name)
                .replace("{id}", &id.to_string())
        };
        ResolvedGroupPaths {
            repo_path: PathBuf::from(sub(&self.repo_path)),
            repo_url: sub(&self.repo_url),
            files_path: PathBuf::from(sub(&self.files_path)),
            files_url: sub(&self.files_url),
        }
    }
}

pub struct ResolvedGroupPaths {
    pub repo_path: PathBuf,
    pub repo_url: String,
    pub files_path: PathBuf,
    pub files_url: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KeyringConfig {
    pub signing: PathBuf,
    pub transport: PathBuf,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TlsConfig {
    pub key: PathBuf,
    pub cert: PathBuf,
    pub trust_anchor: PathBuf,
}

/// Which architecture builds `arch:all` binaries for a given source, per
/// spec.md §4.1. `preference_list` is tried in order; `valid_affinity_tokens`
/// are the wildcard aliases (e.g. `any`, `linux-any`) a candidate must match
/// before it is accepted, mirroring the archive-wide `ARCH_INDEP_PREFERENCE`
/// and `ARCH_INDEP_VALID` settings of the original system.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AffinityPolicy {
    pub preference_list: Vec<String>,
    pub valid_affinity_tokens: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub database_url: String,
    pub keyrings: KeyringConfig,
    pub tls: TlsConfig,
    pub listen: std::net::SocketAddr,
    pub archive: ArchiveResolver,
    pub affinity: AffinityPolicy,
    #[serde(default)]
    pub dispatch_timeout_secs: Option<u64>,
    /// Minimum time a finished, binary-less build job must sit before
    /// `retry_failed` (§4.4) and the reaper's matching sweep (§5) will
    /// clear it for another attempt.
    #[serde(default)]
    pub retry_failed_grace_secs: Option<u64>,
}

/// Default dispatch timeout: a job assigned longer than this without
/// finishing is reclaimed by the reaper via `forfeit_job` (spec.md §5).
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 6 * 3600;

/// Default grace period before a finished, binary-less build job becomes
/// eligible for `retry_failed` (spec.md §4.4 leaves the interval
/// unspecified; six hours matches the default dispatch timeout above).
pub const DEFAULT_RETRY_FAILED_GRACE_SECS: u64 = 6 * 3600;

impl Config {
    pub fn dispatch_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            self.dispatch_timeout_secs.unwrap_or(DEFAULT_DISPATCH_TIMEOUT_SECS) as i64,
        )
    }

    pub fn retry_failed_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            self.retry_failed_grace_secs
                .unwrap_or(DEFAULT_RETRY_FAILED_GRACE_SECS) as i64,
        )
    }
}

impl Config {
    /// Locate and load the configuration file, following the fixed search
    /// order from the external interfaces: an explicit path, then the
    /// user's home directory, then the system directory.
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        let path = Self::discover(explicit)?;
        let base = ConfigBase::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(Environment::with_prefix("PACKHOUSE").separator("__"))
            .build()?;
        Ok(base.try_deserialize()?)
    }

    fn discover(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(home) = dirs_home() {
            let candidate = home.join(".packhouse.yaml");
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        let system = PathBuf::from("/etc/packhouse/config.yaml");
        if system.is_file() {
            return Ok(system);
        }
        Err(crate::Error::String(
            "no packhouse configuration file found (searched explicit path, \
             ~/.packhouse.yaml, /etc/packhouse/config.yaml)"
                .to_string(),
        ))
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
