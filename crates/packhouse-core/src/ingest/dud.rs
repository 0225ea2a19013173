// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic bundle ("dud") ingest, per spec.md §4.3. A dud carries the
//! same shape as a binary upload plus `X-Debile-Failed` and
//! `X-Debile-Check`, and its referenced files (one analysis XML, one log)
//! are filed verbatim into the Result's directory rather than parsed here.

use std::path::Path;

use deb::control::Changes;

use crate::db;
use crate::ingest::{parsing, sibling_paths, unlink_upload, IngestContext, RejectTag};
use crate::model::result_directory;
use crate::Error;

pub async fn accept_dud(ctx: &IngestContext, changes_path: &Path) -> crate::Result<i64> {
    let raw_bytes = std::fs::read(changes_path)?;
    let verified = parsing::verify_and_parse(&ctx.signing_keyring, &raw_bytes)?;
    let changes: Changes = parsing::parse_typed(&verified.content)
        .map_err(|_| Error::Rejected(RejectTag::InvalidDudUpload))?;

    let source_name = changes.source.clone();
    let all_paths: Vec<_> = std::iter::once(changes_path.to_path_buf())
        .chain(sibling_paths(
            changes_path,
            &changes.files.iter().map(|f| f.path.clone()).collect::<Vec<_>>(),
        ))
        .collect();

    let mut tx = ctx.pool.begin().await?;

    let Some(job_id_str) = parsing::field(&verified.raw, "X-Debile-Job") else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::MissingDudJob, &source_name, &all_paths).await);
    };
    let Ok(job_id) = job_id_str.parse::<i64>() else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::MissingDudJob, &source_name, &all_paths).await);
    };
    let job = match db::job_context(&mut *tx, job_id).await {
        Ok(j) => j,
        Err(_) => {
            return Err(crate::ingest::reject(ctx, tx, RejectTag::MissingDudJob, &source_name, &all_paths).await);
        }
    };

    let Some(builder_id) = job.builder_id else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidDudBuilder, &source_name, &all_paths).await);
    };
    let Some(builder) = db::find_builder_by_signing_fingerprint(&mut *tx, &verified.signer_fingerprint).await? else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidDudBuilder, &source_name, &all_paths).await);
    };
    if builder.id != builder_id {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidDudUploader, &source_name, &all_paths).await);
    }

    let Some(failed_str) = parsing::field(&verified.raw, "X-Debile-Failed") else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::NoFailureNotice, &source_name, &all_paths).await);
    };
    let failed = match failed_str.to_lowercase().as_str() {
        "yes" => true,
        "no" => false,
        _ => {
            return Err(crate::ingest::reject(ctx, tx, RejectTag::NoFailureNotice, &source_name, &all_paths).await);
        }
    };

    let dud_files: Vec<std::path::PathBuf> = changes
        .files
        .iter()
        .map(|f| {
            changes_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&f.path)
        })
        .collect();
    let firehose_id = changes
        .files
        .iter()
        .find(|f| f.path.ends_with(".xml"))
        .map(|f| f.path.clone());

    let result_id = db::insert_result(&mut *tx, job_id, chrono::Utc::now(), failed, firehose_id.as_deref(), "").await?;
    let directory = result_directory(&job.source_name, &job.source_version, &job.check_name, &job.arch_name, result_id);
    sqlx::query("UPDATE results SET directory = $1 WHERE id = $2")
        .bind(&directory)
        .bind(result_id)
        .execute(&mut *tx)
        .await?;

    if let Err(err) = ctx.file_repo.add_dud(&directory, &dud_files, ctx.dud_file_mode).await {
        let tag = match err {
            Error::AlreadyRegistered => RejectTag::DudFilesAlreadyRegistered,
            _ => RejectTag::InternalError,
        };
        return Err(crate::ingest::reject(ctx, tx, tag, &source_name, &all_paths).await);
    }

    db::finish_job_with_result(&mut *tx, job_id, failed, None).await?;

    tx.commit().await?;

    ctx.events.emit(
        "receive-result",
        "result",
        serde_json::json!({"source": source_name, "job": job_id, "failed": failed}),
    );
    tracing::info!(source = source_name, job = job_id, failed, "receive-result");
    unlink_upload(&all_paths);

    Ok(result_id)
}
