// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Validates, authenticates, and atomically installs an upload, per
//! spec.md §4.3. Three entry points — [`source::accept_source`],
//! [`binary::accept_binary`], [`dud::accept_dud`] — each produce exactly one
//! of `accept-*`/`receive-result`/`reject-*` as a side effect and then
//! remove the upload's files, whether they succeeded or not.

pub mod binary;
pub mod dud;
mod parsing;
pub mod prune;
mod reject;
pub mod source;

pub use reject::RejectTag;

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::PgPool;

use crate::archive::{FileRepo, Repo};
use crate::config::AffinityPolicy;
use crate::events::EventSink;

/// Default group used when an upload carries no `X-Debile-Group` header,
/// per spec.md §4.3.
pub const DEFAULT_GROUP: &str = "default";

/// Default file mode for diagnostic-bundle files filed by
/// [`crate::archive::FileRepo::add_dud`] when the operator's configuration
/// does not override it.
pub const DEFAULT_DUD_FILE_MODE: u32 = 0o644;

/// Collaborators every ingest entry point needs, constructed once by the
/// embedding application (the `ingest-directory` and `serve` CLIs) and
/// threaded explicitly into every call — spec.md §9's "module-level
/// configuration: avoid".
pub struct IngestContext {
    pub pool: PgPool,
    pub repo: Arc<dyn Repo>,
    pub file_repo: Arc<dyn FileRepo>,
    pub signing_keyring: PathBuf,
    pub events: Arc<dyn EventSink>,
    pub affinity: AffinityPolicy,
    pub dud_file_mode: u32,
}

/// Remove every file belonging to an upload. Invoked on both the
/// acceptance and rejection paths (spec.md §4.3/§7): files of a rejected
/// upload are never quarantined, they are deleted.
pub(crate) fn unlink_upload(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = std::fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), %err, "failed to remove upload file");
            }
        }
    }
}

/// Resolve the sibling files an upload's `Files` table names, relative to
/// the directory the `.changes`/`.dud` control file itself was found in.
pub(crate) fn sibling_paths(control_path: &std::path::Path, filenames: &[String]) -> Vec<PathBuf> {
    let dir = control_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    filenames.iter().map(|name| dir.join(name)).collect()
}

/// Dispatch a discovered `.changes` file to [`source::accept_source`] or
/// [`binary::accept_binary`], mirroring the original system's
/// `is_source_only_upload`/`is_binary_only_upload` split: a changes file
/// carrying a `Binary` field names binary packages and is a binary upload,
/// one without it is source-only. Used by the `ingest-directory` CLI, which
/// otherwise has no way to tell the two apart without reaching into this
/// crate's private parsing helpers.
pub async fn accept_changes(ctx: &IngestContext, changes_path: &std::path::Path) -> crate::Result<i64> {
    let raw_bytes = std::fs::read(changes_path)?;
    let verified = match parsing::verify_and_parse(&ctx.signing_keyring, &raw_bytes) {
        Ok(v) => v,
        Err(crate::Error::Rejected(tag)) => {
            return Err(reject_unparsed(ctx, tag, changes_path).await);
        }
        Err(other) => return Err(other),
    };
    let changes: deb::control::Changes = match parsing::parse_typed(&verified.content) {
        Ok(c) => c,
        Err(_) => {
            return Err(reject_unparsed(ctx, RejectTag::InvalidUpload, changes_path).await);
        }
    };
    if changes.binary.is_some() {
        binary::accept_binary(ctx, changes_path).await
    } else {
        source::accept_source(ctx, changes_path).await
    }
}

/// Reject path for a failure discovered before the upload's shape (and
/// therefore its sibling `Files`) is known: only the control file itself can
/// be unlinked, matching the same early-failure handling in
/// `source::accept_source`/`binary::accept_binary`.
async fn reject_unparsed(
    ctx: &IngestContext,
    tag: RejectTag,
    changes_path: &std::path::Path,
) -> crate::Error {
    let source_name = changes_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    ctx.events.emit(
        "reject",
        &tag.to_string(),
        serde_json::json!({"tag": tag.to_string(), "source": source_name}),
    );
    tracing::warn!(source = source_name, tag = %tag, "REJECT: {source_name} because {tag}");
    unlink_upload(&[changes_path.to_path_buf()]);
    crate::Error::Rejected(tag)
}

/// Roll back `tx`, emit a tagged `reject` event, unlink the upload's files,
/// and return the rejection as the handler's result — the common tail of
/// every ingest failure path (spec.md §4.3, §7).
pub(crate) async fn reject(
    ctx: &IngestContext,
    tx: sqlx::Transaction<'_, sqlx::Postgres>,
    tag: RejectTag,
    source_name: &str,
    all_paths: &[PathBuf],
) -> crate::Error {
    let _ = tx.rollback().await;
    ctx.events.emit(
        "reject",
        &tag.to_string(),
        serde_json::json!({"tag": tag.to_string(), "source": source_name}),
    );
    tracing::warn!(source = source_name, tag = %tag, "REJECT: {source_name} because {tag}");
    unlink_upload(all_paths);
    crate::Error::Rejected(tag)
}
