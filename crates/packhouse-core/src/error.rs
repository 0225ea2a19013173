// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::ingest::RejectTag;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    String(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Deb(#[from] deb::Error),

    /// An upload was rejected for one of the reasons in the closed tag set.
    /// Not necessarily a bug: this is the expected outcome of malformed or
    /// unauthorized uploads and is handled by unlinking the upload and
    /// emitting a `reject` event rather than propagating further.
    #[error("rejected: {0}")]
    Rejected(RejectTag),

    #[error("no valid affinity: preferences {preferences:?}; valid {valid:?}; arches {arches:?}")]
    NoValidAffinity {
        preferences: Vec<String>,
        valid: Vec<String>,
        arches: Vec<String>,
    },

    #[error("unknown job: {0}")]
    UnknownJob(i64),
    #[error("unknown source: {0}")]
    UnknownSource(i64),

    #[error("archive adapter reported the item as already registered")]
    AlreadyRegistered,
    #[error("archive adapter failed: {0}")]
    ArchiveTool(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::String(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::String(value)
    }
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Rejected(tag) => tonic::Status::invalid_argument(tag.to_string()),
            Error::UnknownJob(id) => tonic::Status::not_found(format!("unknown job: {id}")),
            Error::UnknownSource(id) => {
                tonic::Status::not_found(format!("unknown source: {id}"))
            }
            other => {
                tracing::error!(err = ?other, "unexpected error handling request");
                tonic::Status::internal("internal error")
            }
        }
    }
}
