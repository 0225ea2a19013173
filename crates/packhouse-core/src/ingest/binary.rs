// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Binary upload ingest, per spec.md §4.3.

use std::path::Path;

use deb::control::Changes;

use crate::db;
use crate::ingest::{parsing, sibling_paths, unlink_upload, IngestContext, RejectTag};
use crate::model::pool_directory_for_section;
use crate::Error;

/// Accept, validate, and absorb a binary upload found at `changes_path`.
/// Returns the id of the `Binary` row created.
pub async fn accept_binary(ctx: &IngestContext, changes_path: &Path) -> crate::Result<i64> {
    let raw_bytes = std::fs::read(changes_path)?;
    let verified = parsing::verify_and_parse(&ctx.signing_keyring, &raw_bytes)?;
    let changes: Changes = parsing::parse_typed(&verified.content)
        .map_err(|_| Error::Rejected(RejectTag::InvalidUpload))?;

    let source_name = changes.source.clone();
    let all_paths: Vec<_> = std::iter::once(changes_path.to_path_buf())
        .chain(sibling_paths(
            changes_path,
            &changes.files.iter().map(|f| f.path.clone()).collect::<Vec<_>>(),
        ))
        .collect();

    let mut tx = ctx.pool.begin().await?;

    let Some(job_id_str) = parsing::field(&verified.raw, "X-Debile-Job") else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::NoJob, &source_name, &all_paths).await);
    };
    let Ok(job_id) = job_id_str.parse::<i64>() else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::NoJob, &source_name, &all_paths).await);
    };
    let job = match db::job_context(&mut *tx, job_id).await {
        Ok(j) => j,
        Err(_) => {
            return Err(crate::ingest::reject(ctx, tx, RejectTag::NoJob, &source_name, &all_paths).await);
        }
    };

    let Some(builder_id) = job.builder_id else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::WrongBuilder, &source_name, &all_paths).await);
    };
    let Some(builder) = db::find_builder_by_signing_fingerprint(&mut *tx, &verified.signer_fingerprint).await? else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidBuilder, &source_name, &all_paths).await);
    };
    if builder.id != builder_id {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::WrongBuilder, &source_name, &all_paths).await);
    }

    if changes.source != job.source_name {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::BinarySourceNameMismatch, &source_name, &all_paths).await);
    }
    if changes.version.to_string() != job.source_version {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::BinarySourceVersionMismatch, &source_name, &all_paths).await);
    }
    let group_name = parsing::field(&verified.raw, "X-Debile-Group").unwrap_or_else(|| crate::ingest::DEFAULT_GROUP.to_string());
    if group_name != job.group_name {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::BinarySourceGroupMismatch, &source_name, &all_paths).await);
    }
    if changes.distribution != job.suite_name {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::BinarySourceSuiteMismatch, &source_name, &all_paths).await);
    }

    let declared_arches: Vec<String> = changes.architecture.iter().map(|a| a.as_str().to_string()).collect();
    if declared_arches
        .iter()
        .any(|a| a != &job.arch_name && a != crate::model::ARCH_ALL)
    {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::WrongArchitecture, &source_name, &all_paths).await);
    }

    let Some(arch) = db::find_arch_by_name(&mut *tx, &job.arch_name).await? else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::WrongArchitecture, &source_name, &all_paths).await);
    };

    if db::find_binary_by_job_and_arch(&mut *tx, job_id, arch.id).await?.is_some() {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::StupidSourceThing, &source_name, &all_paths).await);
    }

    let binary_id = db::insert_binary(&mut *tx, job.source_id, arch.id, job_id, chrono::Utc::now()).await?;
    db::attach_binary_to_job(&mut *tx, job_id, binary_id).await?;

    let source_directory = job.source_directory.clone().unwrap_or_default();
    for file in changes.files.iter() {
        if file.path.ends_with(".dsc") {
            continue;
        }
        let directory = pool_directory_for_section(&source_directory, &file.section);
        let basename = Path::new(&file.path)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| file.path.clone());
        db::insert_deb(&mut *tx, binary_id, &directory, &basename).await?;
    }

    if let Err(err) = ctx.repo.add_changes(&job.suite_name, changes_path).await {
        let tag = match err {
            Error::AlreadyRegistered => RejectTag::StupidSourceThing,
            _ => RejectTag::InternalError,
        };
        return Err(crate::ingest::reject(ctx, tx, tag, &source_name, &all_paths).await);
    }

    tx.commit().await?;

    ctx.events.emit(
        "accept",
        "binary",
        serde_json::json!({"source": source_name, "job": job_id, "arch": job.arch_name}),
    );
    tracing::info!(source = source_name, job = job_id, "accept binary");
    unlink_upload(&all_paths);

    Ok(binary_id)
}
