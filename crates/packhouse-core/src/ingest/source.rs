// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Source upload ingest, per spec.md §4.3. The single largest entry point
//! of the pipeline: it is also what creates a Source's Jobs, via the
//! planner (§4.2).

use std::path::Path;
use std::str::FromStr;

use deb::control::Changes;
use deb::control::Dsc;
use deb::version::Version;

use crate::arches::{self, NoFallbackOracle};
use crate::db;
use crate::ingest::{parsing, sibling_paths, unlink_upload, IngestContext, RejectTag, DEFAULT_GROUP};
use crate::model::{self, ARCH_ALL, ARCH_SOURCE};
use crate::planner::{self, ExistingBinary, PlannerInput};
use crate::Error;

/// Accept, validate, and absorb a source upload found at `changes_path`,
/// producing either the new Source's row id or a tagged rejection. Either
/// way every file belonging to the upload is removed before returning.
pub async fn accept_source(ctx: &IngestContext, changes_path: &Path) -> crate::Result<i64> {
    let raw_bytes = std::fs::read(changes_path)?;
    let verified = match parsing::verify_and_parse(&ctx.signing_keyring, &raw_bytes) {
        Ok(v) => v,
        Err(Error::Rejected(tag)) => {
            unlink_upload(&[changes_path.to_path_buf()]);
            return Err(Error::Rejected(tag));
        }
        Err(other) => return Err(other),
    };

    let changes: Changes = match parsing::parse_typed(&verified.content) {
        Ok(c) => c,
        Err(_) => {
            unlink_upload(&[changes_path.to_path_buf()]);
            return Err(Error::Rejected(RejectTag::InvalidUpload));
        }
    };

    let source_name = changes.source.clone();
    let all_paths: Vec<_> = std::iter::once(changes_path.to_path_buf())
        .chain(sibling_paths(changes_path, &changes.files.iter().map(|f| f.path.clone()).collect::<Vec<_>>()))
        .collect();

    if changes.binary.is_some() {
        return Err(crate::ingest::reject(ctx, ctx.pool.begin().await?, RejectTag::MixedUpload, &source_name, &all_paths).await);
    }

    let mut tx = ctx.pool.begin().await?;

    let group_name = parsing::field(&verified.raw, "X-Debile-Group").unwrap_or_else(|| DEFAULT_GROUP.to_string());
    let Some(group) = db::find_group_by_name(&mut *tx, &group_name).await? else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidGroup, &source_name, &all_paths).await);
    };

    let Some(uploader) = db::find_person_by_signing_fingerprint(&mut *tx, &verified.signer_fingerprint).await? else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidUser, &source_name, &all_paths).await);
    };

    let Some(group_suite) = db::find_group_suite(&mut *tx, &group.name, &changes.distribution).await? else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidSuiteForGroup, &source_name, &all_paths).await);
    };

    // Re-parse the enclosed .dsc and cross-check it against the changes.
    let Some(dsc_file) = changes.files.iter().find(|f| f.path.ends_with(".dsc")) else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidUpload, &source_name, &all_paths).await);
    };
    let dsc_path = changes_path.parent().unwrap_or_else(|| Path::new(".")).join(&dsc_file.path);
    let dsc_bytes = match std::fs::read(&dsc_path) {
        Ok(b) => b,
        Err(_) => {
            return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidUpload, &source_name, &all_paths).await);
        }
    };
    let dsc_verified = match parsing::verify_and_parse(&ctx.signing_keyring, &dsc_bytes) {
        Ok(v) => v,
        Err(_) => {
            return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidSignature, &source_name, &all_paths).await);
        }
    };
    let dsc: Dsc = match parsing::parse_typed(&dsc_verified.content) {
        Ok(d) => d,
        Err(_) => {
            return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidUpload, &source_name, &all_paths).await);
        }
    };

    if dsc.source != changes.source || dsc.version != changes.version {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::DscDoesNotMarchChanges, &source_name, &all_paths).await);
    }

    let version_str = changes.version.to_string();

    if db::find_source_by_name_version_group(&mut *tx, &source_name, &version_str, group.id)
        .await?
        .is_some()
    {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::SourceAlreadyInGroup, &source_name, &all_paths).await);
    }

    let siblings = db::find_sibling_sources(&mut *tx, &source_name, group_suite.id).await?;
    for sibling in &siblings {
        let Ok(sibling_version) = Version::from_str(&sibling.version) else {
            continue;
        };
        if sibling_version > changes.version {
            return Err(crate::ingest::reject(ctx, tx, RejectTag::NewerSourceAlreadyInSuite, &source_name, &all_paths).await);
        }
    }

    // §4.1: compute the target arch set and affinity.
    let suite_arches = db::group_suite_arches(&mut *tx, group_suite.id).await?;
    let dsc_arch_tokens: Vec<String> = dsc
        .architecture
        .as_ref()
        .map(|a| a.iter().map(|arch| arch.as_str().to_string()).collect())
        .unwrap_or_else(|| changes.architecture.iter().map(|arch| arch.as_str().to_string()).collect());
    let oracle = NoFallbackOracle;
    let target_arches = arches::source_arches(&dsc_arch_tokens, &suite_arches, &oracle);
    if target_arches.is_empty() {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::NoArchitecture, &source_name, &all_paths).await);
    }

    let affinity_candidates: Vec<_> = target_arches
        .iter()
        .filter(|a| a.name != ARCH_ALL && a.name != ARCH_SOURCE)
        .cloned()
        .collect();
    let affinity_candidates = if affinity_candidates.is_empty() {
        suite_arches
            .iter()
            .filter(|a| a.name != ARCH_ALL && a.name != ARCH_SOURCE)
            .cloned()
            .collect()
    } else {
        affinity_candidates
    };
    let affinity = match arches::preferred_affinity(
        &ctx.affinity.preference_list,
        &ctx.affinity.valid_affinity_tokens,
        &affinity_candidates,
        &oracle,
    ) {
        Ok(a) => a,
        Err(_) => {
            return Err(crate::ingest::reject(ctx, tx, RejectTag::NoArchitecture, &source_name, &all_paths).await);
        }
    };

    // The pool component is carried on the .dsc's own Files entry: a bare
    // section name ("libs") belongs to the default "main" component, a
    // slash-prefixed one ("contrib/libs") names it explicitly.
    let component_name = dsc_file
        .section
        .split_once('/')
        .map(|(component, _)| component)
        .unwrap_or("main");
    let group_suite_components = db::group_suite_components(&mut *tx, group_suite.id).await?;
    let Some(component) = group_suite_components.into_iter().find(|c| c.name == component_name) else {
        return Err(crate::ingest::reject(ctx, tx, RejectTag::InvalidUpload, &source_name, &all_paths).await);
    };

    let checks = db::group_suite_checks(&mut *tx, group_suite.id).await?;

    let planner_input = PlannerInput {
        target_arches: &target_arches,
        affinity: &affinity,
        checks: &checks,
        existing_binaries: &[] as &[ExistingBinary],
    };
    let planned = planner::plan_jobs(&planner_input);

    let source_id = db::insert_source(
        &mut *tx,
        &source_name,
        &version_str,
        group_suite.id,
        component.id,
        affinity.id,
        uploader.id,
        chrono::Utc::now(),
    )
    .await?;

    let xsbc_original_maintainer = parsing::field(&dsc_verified.raw, "XSBC-Original-Maintainer");
    for (name, email, comaintainer) in model::parse_maintainers(
        Some(&dsc.maintainer),
        xsbc_original_maintainer.as_deref(),
        dsc.uploaders.as_ref().map(|u| u.join(", ")).as_deref(),
    ) {
        db::insert_maintainer(&mut *tx, source_id, &name, &email, comaintainer).await?;
    }

    let mut job_ids = Vec::with_capacity(planned.len());
    for job in &planned {
        let id = db::insert_job(&mut *tx, source_id, job.check_id, job.arch_id, job.existing_binary_id).await?;
        job_ids.push(id);
    }
    for (idx, job) in planned.iter().enumerate() {
        for &dep in &job.depends_on {
            db::insert_job_dependency(&mut *tx, job_ids[idx], job_ids[dep]).await?;
        }
    }

    // §3: at most one current Source per (name, group); clear out the
    // predecessors' unfinished work.
    for sibling in &siblings {
        db::delete_unstarted_jobs(&mut *tx, sibling.id).await?;
        db::mark_source_jobs_failed_if_unfinished(&mut *tx, sibling.id).await?;
    }

    if let Err(err) = ctx.repo.add_changes(&changes.distribution, changes_path).await {
        let tag = match err {
            Error::AlreadyRegistered => RejectTag::StupidSourceThing,
            _ => RejectTag::InternalError,
        };
        return Err(crate::ingest::reject(ctx, tx, tag, &source_name, &all_paths).await);
    }

    if let Ok((directory, dsc_filename)) = ctx.repo.find_dsc(&source_name, &version_str).await {
        db::set_source_pool_location(&mut *tx, source_id, &directory, &dsc_filename).await?;
    }

    tx.commit().await?;

    ctx.events.emit(
        "accept",
        "source",
        serde_json::json!({"name": source_name, "version": version_str, "group": group.name}),
    );
    tracing::info!(source = source_name, version = version_str, "accept source");
    unlink_upload(&all_paths);

    Ok(source_id)
}
