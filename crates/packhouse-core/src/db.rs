// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hand-written queries against the relational schema in `migrations/`.
//! `sqlx::query!` is avoided throughout (no live database is available to
//! drive its compile-time check), in favor of the runtime query-builder
//! style `sqlx::query_as`/`sqlx::query` use elsewhere in the Rust ecosystem
//! for the same reason; see SPEC_FULL.md §2.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};

use crate::model::{
    Arch, Binary, Builder, Check, Component, Group, GroupSuite, Job, JobState, Person, Source,
};
use crate::{Error, Result};

pub async fn find_group_by_name(conn: &mut PgConnection, name: &str) -> Result<Option<Group>> {
    sqlx::query_as::<_, Group>("SELECT id, name FROM groups WHERE name = $1")
        .bind(name)
        .fetch_optional(conn)
        .await
        .map_err(Error::from)
}

pub async fn find_group_suite(
    conn: &mut PgConnection,
    group_name: &str,
    suite_name: &str,
) -> Result<Option<GroupSuite>> {
    sqlx::query_as::<_, GroupSuite>(
        "SELECT gs.id, gs.group_id, gs.suite_id FROM group_suites gs \
         JOIN groups g ON g.id = gs.group_id \
         JOIN suites s ON s.id = gs.suite_id \
         WHERE g.name = $1 AND s.name = $2",
    )
    .bind(group_name)
    .bind(suite_name)
    .fetch_optional(conn)
    .await
    .map_err(Error::from)
}

pub async fn group_suite_arches(
    conn: &mut PgConnection,
    group_suite_id: i64,
) -> Result<Vec<Arch>> {
    sqlx::query_as::<_, Arch>(
        "SELECT a.id, a.name FROM group_suite_arches gsa \
         JOIN architectures a ON a.id = gsa.arch_id \
         WHERE gsa.group_suite_id = $1",
    )
    .bind(group_suite_id)
    .fetch_all(conn)
    .await
    .map_err(Error::from)
}

pub async fn group_suite_checks(
    conn: &mut PgConnection,
    group_suite_id: i64,
) -> Result<Vec<Check>> {
    sqlx::query_as::<_, Check>(
        "SELECT c.id, c.name, c.source, c.binary, c.build FROM group_suite_checks gsc \
         JOIN checks c ON c.id = gsc.check_id \
         WHERE gsc.group_suite_id = $1",
    )
    .bind(group_suite_id)
    .fetch_all(conn)
    .await
    .map_err(Error::from)
}

pub async fn find_component(conn: &mut PgConnection, name: &str) -> Result<Option<Component>> {
    sqlx::query_as::<_, Component>("SELECT id, name FROM components WHERE name = $1")
        .bind(name)
        .fetch_optional(conn)
        .await
        .map_err(Error::from)
}

pub async fn find_arch_by_name(conn: &mut PgConnection, name: &str) -> Result<Option<Arch>> {
    sqlx::query_as::<_, Arch>("SELECT id, name FROM architectures WHERE name = $1")
        .bind(name)
        .fetch_optional(conn)
        .await
        .map_err(Error::from)
}

pub async fn find_check_by_name(conn: &mut PgConnection, name: &str) -> Result<Option<Check>> {
    sqlx::query_as::<_, Check>("SELECT id, name, source, binary, build FROM checks WHERE name = $1")
        .bind(name)
        .fetch_optional(conn)
        .await
        .map_err(Error::from)
}

pub async fn find_check(conn: &mut PgConnection, id: i64) -> Result<Check> {
    sqlx::query_as::<_, Check>("SELECT id, name, source, binary, build FROM checks WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| Error::String(format!("unknown check: {id}")))
}

pub async fn group_suite_components(
    conn: &mut PgConnection,
    group_suite_id: i64,
) -> Result<Vec<Component>> {
    sqlx::query_as::<_, Component>(
        "SELECT co.id, co.name FROM group_suite_components gsc \
         JOIN components co ON co.id = gsc.component_id \
         WHERE gsc.group_suite_id = $1",
    )
    .bind(group_suite_id)
    .fetch_all(conn)
    .await
    .map_err(Error::from)
}

/// Insert a row if its name is unseen, otherwise return the existing row's
/// id. Used by the `init-database` CLI to load a YAML seed idempotently, so
/// rerunning it against an already-seeded archive is a no-op rather than a
/// unique-constraint error.
pub async fn upsert_group(conn: &mut PgConnection, name: &str) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO groups (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id",
    )
    .bind(name)
    .fetch_one(conn)
    .await
    .map_err(Error::from)
}

pub async fn upsert_suite(conn: &mut PgConnection, name: &str) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO suites (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id",
    )
    .bind(name)
    .fetch_one(conn)
    .await
    .map_err(Error::from)
}

pub async fn upsert_component(conn: &mut PgConnection, name: &str) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO components (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id",
    )
    .bind(name)
    .fetch_one(conn)
    .await
    .map_err(Error::from)
}

pub async fn upsert_arch(conn: &mut PgConnection, name: &str) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO architectures (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id",
    )
    .bind(name)
    .fetch_one(conn)
    .await
    .map_err(Error::from)
}

pub async fn upsert_check(
    conn: &mut PgConnection,
    name: &str,
    source: bool,
    binary: bool,
    build: bool,
) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO checks (name, source, binary, build) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (name) DO UPDATE SET source = EXCLUDED.source, binary = EXCLUDED.binary, build = EXCLUDED.build \
         RETURNING id",
    )
    .bind(name)
    .bind(source)
    .bind(binary)
    .bind(build)
    .fetch_one(conn)
    .await
    .map_err(Error::from)
}

pub async fn upsert_group_suite(conn: &mut PgConnection, group_id: i64, suite_id: i64) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO group_suites (group_id, suite_id) VALUES ($1, $2) \
         ON CONFLICT (group_id, suite_id) DO UPDATE SET group_id = EXCLUDED.group_id \
         RETURNING id",
    )
    .bind(group_id)
    .bind(suite_id)
    .fetch_one(conn)
    .await
    .map_err(Error::from)
}

pub async fn add_group_suite_arch(conn: &mut PgConnection, group_suite_id: i64, arch_id: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO group_suite_arches (group_suite_id, arch_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(group_suite_id)
    .bind(arch_id)
    .execute(conn)
    .await
    .map_err(Error::from)?;
    Ok(())
}

pub async fn add_group_suite_component(conn: &mut PgConnection, group_suite_id: i64, component_id: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO group_suite_components (group_suite_id, component_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(group_suite_id)
    .bind(component_id)
    .execute(conn)
    .await
    .map_err(Error::from)?;
    Ok(())
}

pub async fn add_group_suite_check(conn: &mut PgConnection, group_suite_id: i64, check_id: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO group_suite_checks (group_suite_id, check_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(group_suite_id)
    .bind(check_id)
    .execute(conn)
    .await
    .map_err(Error::from)?;
    Ok(())
}

pub async fn find_person_by_signing_fingerprint(
    conn: &mut PgConnection,
    fingerprint: &str,
) -> Result<Option<Person>> {
    sqlx::query_as::<_, Person>(
        "SELECT id, name, email, signing_fingerprint, transport_fingerprint \
         FROM people WHERE signing_fingerprint = $1",
    )
    .bind(fingerprint)
    .fetch_optional(conn)
    .await
    .map_err(Error::from)
}

pub async fn find_builder_by_signing_fingerprint(
    conn: &mut PgConnection,
    fingerprint: &str,
) -> Result<Option<Builder>> {
    sqlx::query_as::<_, Builder>(
        "SELECT id, name, email, signing_fingerprint, transport_fingerprint, last_ping \
         FROM builders WHERE signing_fingerprint = $1",
    )
    .bind(fingerprint)
    .fetch_optional(conn)
    .await
    .map_err(Error::from)
}

pub async fn find_builder_by_transport_fingerprint(
    conn: &mut PgConnection,
    fingerprint: &str,
) -> Result<Option<Builder>> {
    sqlx::query_as::<_, Builder>(
        "SELECT id, name, email, signing_fingerprint, transport_fingerprint, last_ping \
         FROM builders WHERE transport_fingerprint = $1",
    )
    .bind(fingerprint)
    .fetch_optional(conn)
    .await
    .map_err(Error::from)
}

pub async fn find_person_by_transport_fingerprint(
    conn: &mut PgConnection,
    fingerprint: &str,
) -> Result<Option<Person>> {
    sqlx::query_as::<_, Person>(
        "SELECT id, name, email, signing_fingerprint, transport_fingerprint \
         FROM people WHERE transport_fingerprint = $1",
    )
    .bind(fingerprint)
    .fetch_optional(conn)
    .await
    .map_err(Error::from)
}

pub async fn find_source_by_name_version_group(
    conn: &mut PgConnection,
    name: &str,
    version: &str,
    group_id: i64,
) -> Result<Option<Source>> {
    sqlx::query_as::<_, Source>(
        "SELECT s.id, s.name, s.version, s.group_suite_id, s.component_id, \
                s.affinity_arch_id, s.uploader_id, s.uploaded_at, s.directory, s.dsc_filename \
         FROM sources s \
         JOIN group_suites gs ON gs.id = s.group_suite_id \
         WHERE s.name = $1 AND s.version = $2 AND gs.group_id = $3",
    )
    .bind(name)
    .bind(version)
    .bind(group_id)
    .fetch_optional(conn)
    .await
    .map_err(Error::from)
}

/// Every other current Source sharing (name, group_suite), for the "at most
/// one current Source" invariant in spec.md §3.
pub async fn find_sibling_sources(
    conn: &mut PgConnection,
    name: &str,
    group_suite_id: i64,
) -> Result<Vec<Source>> {
    sqlx::query_as::<_, Source>(
        "SELECT id, name, version, group_suite_id, component_id, affinity_arch_id, \
                uploader_id, uploaded_at, directory, dsc_filename \
         FROM sources WHERE name = $1 AND group_suite_id = $2",
    )
    .bind(name)
    .bind(group_suite_id)
    .fetch_all(conn)
    .await
    .map_err(Error::from)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_source(
    conn: &mut PgConnection,
    name: &str,
    version: &str,
    group_suite_id: i64,
    component_id: i64,
    affinity_arch_id: i64,
    uploader_id: i64,
    uploaded_at: DateTime<Utc>,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO sources \
            (name, version, group_suite_id, component_id, affinity_arch_id, uploader_id, uploaded_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
    )
    .bind(name)
    .bind(version)
    .bind(group_suite_id)
    .bind(component_id)
    .bind(affinity_arch_id)
    .bind(uploader_id)
    .bind(uploaded_at)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn set_source_pool_location(
    conn: &mut PgConnection,
    source_id: i64,
    directory: &str,
    dsc_filename: &str,
) -> Result<()> {
    sqlx::query("UPDATE sources SET directory = $1, dsc_filename = $2 WHERE id = $3")
        .bind(directory)
        .bind(dsc_filename)
        .bind(source_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_maintainer(
    conn: &mut PgConnection,
    source_id: i64,
    name: &str,
    email: &str,
    comaintainer: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO maintainers (source_id, name, email, comaintainer) VALUES ($1, $2, $3, $4)",
    )
    .bind(source_id)
    .bind(name)
    .bind(email)
    .bind(comaintainer)
    .execute(conn)
    .await?;
    Ok(())
}

/// Every Source in the archive, for the pruning pass (spec.md §3 "Lifecycle").
pub async fn all_sources(conn: &mut PgConnection) -> Result<Vec<Source>> {
    sqlx::query_as::<_, Source>(
        "SELECT id, name, version, group_suite_id, component_id, affinity_arch_id, \
                uploader_id, uploaded_at, directory, dsc_filename FROM sources",
    )
    .fetch_all(conn)
    .await
    .map_err(Error::from)
}

pub async fn delete_source_cascade(conn: &mut PgConnection, source_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM sources WHERE id = $1")
        .bind(source_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn mark_source_jobs_failed_if_unfinished(
    conn: &mut PgConnection,
    source_id: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET failed = true, finished_at = now() \
         WHERE source_id = $1 AND finished_at IS NULL AND binary_id IS NULL",
    )
    .bind(source_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete_unstarted_jobs(conn: &mut PgConnection, source_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM jobs WHERE source_id = $1 AND assigned_at IS NULL")
        .bind(source_id)
        .execute(conn)
        .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_job(
    conn: &mut PgConnection,
    source_id: i64,
    check_id: i64,
    arch_id: i64,
    existing_binary_id: Option<i64>,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO jobs (source_id, check_id, arch_id, binary_id, state, assigned_count) \
         VALUES ($1, $2, $3, $4, 'pending', 0) RETURNING id",
    )
    .bind(source_id)
    .bind(check_id)
    .bind(arch_id)
    .bind(existing_binary_id)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn insert_job_dependency(
    conn: &mut PgConnection,
    job_id: i64,
    depends_on_job_id: i64,
) -> Result<()> {
    sqlx::query("INSERT INTO job_dependencies (job_id, depends_on_job_id) VALUES ($1, $2)")
        .bind(job_id)
        .bind(depends_on_job_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn find_job(conn: &mut PgConnection, job_id: i64) -> Result<Job> {
    sqlx::query_as::<_, Job>(
        "SELECT id, source_id, check_id, arch_id, binary_id, builder_id, state, \
                assigned_at, assigned_count, finished_at, failed, dose_report \
         FROM jobs WHERE id = $1",
    )
    .bind(job_id)
    .fetch_optional(conn)
    .await?
    .ok_or(Error::UnknownJob(job_id))
}

/// Flat, fully-joined view of a Job used by the ingest pipeline to check a
/// binary or diagnostic upload's claimed (source, version, group, suite)
/// against the Job it references, without a second round-trip per field.
#[derive(Clone, Debug, FromRow)]
pub struct JobContext {
    pub job_id: i64,
    pub source_id: i64,
    pub builder_id: Option<i64>,
    pub state: JobState,
    pub binary_id: Option<i64>,
    pub source_name: String,
    pub source_version: String,
    pub source_directory: Option<String>,
    pub group_id: i64,
    pub group_name: String,
    pub suite_name: String,
    pub component_name: String,
    pub check_name: String,
    pub arch_name: String,
    pub affinity_name: String,
}

pub async fn job_context(conn: &mut PgConnection, job_id: i64) -> Result<JobContext> {
    sqlx::query_as::<_, JobContext>(
        "SELECT j.id AS job_id, j.source_id, j.builder_id, j.state, j.binary_id, \
                src.name AS source_name, src.version AS source_version, src.directory AS source_directory, \
                g.id AS group_id, g.name AS group_name, su.name AS suite_name, \
                co.name AS component_name, c.name AS check_name, a.name AS arch_name, \
                aff.name AS affinity_name \
         FROM jobs j \
         JOIN sources src ON src.id = j.source_id \
         JOIN group_suites gs ON gs.id = src.group_suite_id \
         JOIN groups g ON g.id = gs.group_id \
         JOIN suites su ON su.id = gs.suite_id \
         JOIN components co ON co.id = src.component_id \
         JOIN checks c ON c.id = j.check_id \
         JOIN architectures a ON a.id = j.arch_id \
         JOIN architectures aff ON aff.id = src.affinity_arch_id \
         WHERE j.id = $1",
    )
    .bind(job_id)
    .fetch_optional(conn)
    .await?
    .ok_or(Error::UnknownJob(job_id))
}

pub async fn find_source(conn: &mut PgConnection, source_id: i64) -> Result<Source> {
    sqlx::query_as::<_, Source>(
        "SELECT id, name, version, group_suite_id, component_id, affinity_arch_id, \
                uploader_id, uploaded_at, directory, dsc_filename \
         FROM sources WHERE id = $1",
    )
    .bind(source_id)
    .fetch_optional(conn)
    .await?
    .ok_or(Error::UnknownSource(source_id))
}

/// Existing Binary for a (job, arch) pair, enforcing the at-most-once
/// pairing described in spec.md §5 ("Binary ingest is serialized against
/// the paired build job through the unique index on (job, arch)").
pub async fn find_binary_by_job_and_arch(
    conn: &mut PgConnection,
    build_job_id: i64,
    arch_id: i64,
) -> Result<Option<Binary>> {
    sqlx::query_as::<_, Binary>(
        "SELECT id, source_id, arch_id, build_job_id, uploaded_at \
         FROM binaries WHERE build_job_id = $1 AND arch_id = $2",
    )
    .bind(build_job_id)
    .bind(arch_id)
    .fetch_optional(conn)
    .await
    .map_err(Error::from)
}

pub async fn existing_binaries_for_source(
    conn: &mut PgConnection,
    source_id: i64,
) -> Result<Vec<Binary>> {
    sqlx::query_as::<_, Binary>(
        "SELECT id, source_id, arch_id, build_job_id, uploaded_at FROM binaries WHERE source_id = $1",
    )
    .bind(source_id)
    .fetch_all(conn)
    .await
    .map_err(Error::from)
}

pub async fn insert_binary(
    conn: &mut PgConnection,
    source_id: i64,
    arch_id: i64,
    build_job_id: i64,
    uploaded_at: DateTime<Utc>,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO binaries (source_id, arch_id, build_job_id, uploaded_at) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(source_id)
    .bind(arch_id)
    .bind(build_job_id)
    .bind(uploaded_at)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn attach_binary_to_job(conn: &mut PgConnection, job_id: i64, binary_id: i64) -> Result<()> {
    sqlx::query("UPDATE jobs SET binary_id = $1 WHERE id = $2")
        .bind(binary_id)
        .bind(job_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_deb(
    conn: &mut PgConnection,
    binary_id: i64,
    directory: &str,
    filename: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO debs (binary_id, directory, filename) VALUES ($1, $2, $3)")
        .bind(binary_id)
        .bind(directory)
        .bind(filename)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_result(
    conn: &mut PgConnection,
    job_id: i64,
    uploaded_at: DateTime<Utc>,
    failed: bool,
    firehose_id: Option<&str>,
    directory: &str,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO results (job_id, uploaded_at, failed, firehose_id, directory) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(job_id)
    .bind(uploaded_at)
    .bind(failed)
    .bind(firehose_id)
    .bind(directory)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn finish_job_with_result(
    conn: &mut PgConnection,
    job_id: i64,
    failed: bool,
    dose_report: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET state = 'reported', failed = $1, dose_report = $2 WHERE id = $3",
    )
    .bind(failed)
    .bind(dose_report)
    .bind(job_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// All unfulfilled dependency ids for a job: the `depends_on_job_id`s whose
/// own job is not yet in `finished`/`reported` state with `failed = false`.
pub async fn unfulfilled_dependencies(conn: &mut PgConnection, job_id: i64) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT count(*) FROM job_dependencies jd \
         JOIN jobs dep ON dep.id = jd.depends_on_job_id \
         WHERE jd.job_id = $1 \
           AND NOT (dep.state IN ('finished', 'reported') AND dep.failed IS DISTINCT FROM true)",
    )
    .bind(job_id)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

/// Select and atomically dispatch the next assignable Job to `builder_id`,
/// per the ordering and filters in spec.md §4.4. `real_arches` is the
/// caller's requested arch list with `source`/`all` already stripped, and
/// `wants_pseudo` is whether the caller also accepts `source`/`all` jobs
/// whose source's affinity matches `real_arches`.
#[allow(clippy::too_many_arguments)]
pub async fn dispatch_next_job(
    conn: &mut PgConnection,
    builder_id: i64,
    suites: &[String],
    components: &[String],
    checks: &[String],
    real_arches: &[String],
) -> Result<Option<Job>> {
    // The `SELECT ... FOR UPDATE SKIP LOCKED` row lock only outlives its own
    // statement under Postgres's implicit per-statement autocommit; picking
    // the job and stamping it as assigned must therefore be one statement,
    // not a SELECT followed by a separate UPDATE, or two concurrent callers
    // could both select the same pending job before either commits (spec.md
    // §8 property 5: "each newly created Job is returned to at most one
    // caller").
    let assigned: Option<(i64,)> = sqlx::query_as(
        "UPDATE jobs SET assigned_at = now(), assigned_count = assigned_count + 1, \
                state = 'assigned', builder_id = $1 \
         WHERE id = ( \
             SELECT j.id FROM jobs j \
             JOIN sources src ON src.id = j.source_id \
             JOIN group_suites gs ON gs.id = src.group_suite_id \
             JOIN suites su ON su.id = gs.suite_id \
             JOIN components co ON co.id = src.component_id \
             JOIN checks c ON c.id = j.check_id \
             JOIN architectures a ON a.id = j.arch_id \
             JOIN architectures aff ON aff.id = src.affinity_arch_id \
             WHERE j.state = 'pending' \
               AND j.dose_report IS NULL \
               AND j.assigned_at IS NULL AND j.finished_at IS NULL AND j.failed IS NULL \
               AND su.name = ANY($2) \
               AND co.name = ANY($3) \
               AND c.name = ANY($4) \
               AND (a.name = ANY($5) OR (a.name IN ('source', 'all') AND aff.name = ANY($5))) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM job_dependencies jd JOIN jobs dep ON dep.id = jd.depends_on_job_id \
                   WHERE jd.job_id = j.id \
                     AND NOT (dep.state IN ('finished', 'reported') AND dep.failed IS DISTINCT FROM true) \
               ) \
             ORDER BY j.assigned_count ASC, c.build DESC, src.uploaded_at ASC \
             LIMIT 1 FOR UPDATE OF j SKIP LOCKED \
         ) \
         RETURNING id",
    )
    .bind(builder_id)
    .bind(suites)
    .bind(components)
    .bind(checks)
    .bind(real_arches)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((job_id,)) = assigned else {
        return Ok(None);
    };

    Ok(Some(find_job(conn, job_id).await?))
}

pub async fn close_job(conn: &mut PgConnection, job_id: i64) -> Result<()> {
    sqlx::query("UPDATE jobs SET finished_at = now(), state = 'finished' WHERE id = $1")
        .bind(job_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn forfeit_job(conn: &mut PgConnection, job_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET assigned_at = NULL, builder_id = NULL, state = 'pending' WHERE id = $1",
    )
    .bind(job_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Clears a job back to its pre-assignment state, the common tail of
/// `rerun_job`, `rerun_check`, and `retry_failed`.
pub async fn clear_job_for_rerun(conn: &mut PgConnection, job_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET failed = NULL, builder_id = NULL, assigned_at = NULL, \
                finished_at = NULL, dose_report = NULL, state = 'pending' WHERE id = $1",
    )
    .bind(job_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Whether `source_id` is the current (latest-version) Source for its
/// (name, group_suite).
pub async fn is_latest_source(conn: &mut PgConnection, source_id: i64) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        "SELECT NOT EXISTS ( \
             SELECT 1 FROM sources other \
             JOIN sources this ON this.id = $1 \
             WHERE other.name = this.name AND other.group_suite_id = this.group_suite_id \
               AND other.id <> this.id \
               AND other.uploaded_at > this.uploaded_at \
         )",
    )
    .bind(source_id)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

/// Every job of a named check belonging to a current source, for `rerun_check`.
pub async fn jobs_for_current_sources_by_check(
    conn: &mut PgConnection,
    check_name: &str,
) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT j.id FROM jobs j \
         JOIN checks c ON c.id = j.check_id \
         JOIN sources s ON s.id = j.source_id \
         WHERE c.name = $1 AND NOT EXISTS ( \
             SELECT 1 FROM sources other \
             WHERE other.name = s.name AND other.group_suite_id = s.group_suite_id \
               AND other.uploaded_at > s.uploaded_at \
         )",
    )
    .bind(check_name)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Every finished build job with no binary, finished longer ago than `grace`,
/// for `retry_failed`.
pub async fn stale_failed_build_jobs(
    conn: &mut PgConnection,
    grace: chrono::Duration,
) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT j.id FROM jobs j JOIN checks c ON c.id = j.check_id \
         WHERE c.build AND j.binary_id IS NULL AND j.finished_at IS NOT NULL \
           AND j.finished_at < now() - $1::interval",
    )
    .bind(format!("{} seconds", grace.num_seconds()))
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Jobs past the dispatch timeout: assigned but not finished.
pub async fn timed_out_jobs(conn: &mut PgConnection, timeout: chrono::Duration) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM jobs WHERE assigned_at IS NOT NULL AND finished_at IS NULL \
           AND assigned_at < now() - $1::interval",
    )
    .bind(format!("{} seconds", timeout.num_seconds()))
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Jobs closed but never given a diagnostic bundle, past the one-day grace.
pub async fn missing_diagnostic_jobs(conn: &mut PgConnection) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM jobs WHERE state = 'finished' AND dose_report IS NULL \
           AND finished_at < now() - interval '1 day'",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Build jobs that reported success but produced no binary within seven days.
pub async fn missing_binary_jobs(conn: &mut PgConnection) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT j.id FROM jobs j JOIN checks c ON c.id = j.check_id \
         WHERE c.build AND j.state = 'reported' AND j.failed = false AND j.binary_id IS NULL \
           AND j.finished_at < now() - interval '7 days'",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn touch_builder_last_ping(conn: &mut PgConnection, builder_id: i64) -> Result<()> {
    sqlx::query("UPDATE builders SET last_ping = now() WHERE id = $1")
        .bind(builder_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn count_assigned_unfinished_jobs(conn: &mut PgConnection) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT count(*) FROM jobs WHERE assigned_at IS NOT NULL AND finished_at IS NULL",
    )
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn insert_person(
    conn: &mut PgConnection,
    name: &str,
    email: &str,
    signing_fingerprint: &str,
    transport_fingerprint: &str,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO people (name, email, signing_fingerprint, transport_fingerprint) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(name)
    .bind(email)
    .bind(signing_fingerprint)
    .bind(transport_fingerprint)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn insert_builder(
    conn: &mut PgConnection,
    name: &str,
    email: &str,
    signing_fingerprint: &str,
    transport_fingerprint: &str,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO builders (name, email, signing_fingerprint, transport_fingerprint, last_ping) \
         VALUES ($1, $2, $3, $4, now()) RETURNING id",
    )
    .bind(name)
    .bind(email)
    .bind(signing_fingerprint)
    .bind(transport_fingerprint)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn update_person_keys(
    conn: &mut PgConnection,
    person_id: i64,
    signing_fingerprint: &str,
    transport_fingerprint: &str,
) -> Result<()> {
    sqlx::query("UPDATE people SET signing_fingerprint = $1, transport_fingerprint = $2 WHERE id = $3")
        .bind(signing_fingerprint)
        .bind(transport_fingerprint)
        .bind(person_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_builder_keys(
    conn: &mut PgConnection,
    builder_id: i64,
    signing_fingerprint: &str,
    transport_fingerprint: &str,
) -> Result<()> {
    sqlx::query("UPDATE builders SET signing_fingerprint = $1, transport_fingerprint = $2 WHERE id = $3")
        .bind(signing_fingerprint)
        .bind(transport_fingerprint)
        .bind(builder_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn disable_person(conn: &mut PgConnection, person_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE people SET signing_fingerprint = $1, transport_fingerprint = $1 WHERE id = $2",
    )
    .bind(crate::model::DISABLED_SENTINEL)
    .bind(person_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn disable_builder(conn: &mut PgConnection, builder_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE builders SET signing_fingerprint = $1, transport_fingerprint = $1 WHERE id = $2",
    )
    .bind(crate::model::DISABLED_SENTINEL)
    .bind(builder_id)
    .execute(conn)
    .await?;
    Ok(())
}
