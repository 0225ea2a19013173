// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Job planner, scheduler, and ingest pipeline for the packhouse archive
//! coordinator (spec.md / SPEC_FULL.md). This crate is the core described in
//! SPEC_FULL.md §2: everything else (shell CLIs, check adapters, transport
//! credential stores) is an external collaborator that talks to this crate
//! through the traits and entry points exported here.

pub mod arches;
pub mod archive;
pub mod config;
pub(crate) mod db;
pub mod error;
pub mod events;
pub mod ingest;
pub mod keyring;
pub mod model;
pub mod planner;
pub mod reaper;
pub mod scheduler;
pub mod seed;

pub use error::{Error, Result};

/// Run every pending migration under `migrations/` against `pool`. Used by
/// the `init-database` CLI, and by integration tests that stand up a
/// throwaway database.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Look up a group by name and resolve its repository and file-area
/// locations, for CLIs (`ingest-directory`) that operate on one group's
/// spool directory at a time.
pub async fn resolve_group_paths(
    pool: &sqlx::PgPool,
    archive: &config::ArchiveResolver,
    group_name: &str,
) -> Result<Option<config::ResolvedGroupPaths>> {
    let mut conn = pool.acquire().await?;
    let Some(group) = db::find_group_by_name(&mut conn, group_name).await? else {
        return Ok(None);
    };
    Ok(Some(group.resolve(archive)?))
}

/// Count jobs currently assigned-but-unfinished, for the `serve` CLI's
/// drain loop (spec.md §4.4/§6): the server exits once this reaches zero
/// after a shutdown has been requested.
pub async fn count_assigned_unfinished_jobs(pool: &sqlx::PgPool) -> Result<i64> {
    let mut conn = pool.acquire().await?;
    db::count_assigned_unfinished_jobs(&mut conn).await
}
