// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! The authenticated RPC surface seen by workers and administrative users,
//! per spec.md §4.4. Implements the two `tonic`-generated service traits
//! from `packhouse-proto` directly against hand-written queries in
//! [`crate::db`]; the per-request context the original system threaded
//! through thread-local storage (spec.md §9) is instead the return value of
//! [`authenticate_builder`]/[`authenticate_user`], passed explicitly into
//! whatever the handler does next.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use packhouse_proto::principals::principal_service_server::PrincipalService;
use packhouse_proto::principals::{
    CreateBuilderRequest, CreateUserRequest, DisablePrincipalRequest, PrincipalReply,
    UpdateKeysRequest,
};
use packhouse_proto::scheduler::scheduler_service_server::SchedulerService;
use packhouse_proto::scheduler::{
    CloseJobRequest, CloseJobResponse, ForfeitJobRequest, ForfeitJobResponse, GetNextJobRequest,
    GetNextJobResponse, Job as ProtoJob, RerunCheckRequest, RerunCheckResponse, RerunJobRequest,
    RerunJobResponse, RetryFailedRequest, RetryFailedResponse,
};
use sha1::{Digest, Sha1};
use sqlx::PgPool;
use tonic::{Request, Response, Status};

use crate::db;
use crate::events::EventSink;
use crate::model::{Builder, Check, Job, Person, Principal, ARCH_ALL, ARCH_SOURCE};
use crate::{Error, Result};

/// The job-control and principal-management RPC surface, built once by the
/// `serve` CLI and shared across every connection. Holds no per-request
/// state: the database is the single source of truth for job state
/// (spec.md §5).
#[derive(Clone)]
pub struct PackhouseServer {
    pub pool: PgPool,
    pub events: Arc<dyn EventSink>,
    pub signing_keyring: std::path::PathBuf,
    pub transport_keyring: std::path::PathBuf,
    pub shutdown: Arc<AtomicBool>,
}

impl PackhouseServer {
    pub fn is_draining(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// SHA-1 fingerprint (hex, lowercase) of the first certificate the peer
/// presented on this connection, in the same format
/// [`crate::keyring::import_transport`] stores on `Principal` rows.
fn peer_fingerprint<T>(request: &Request<T>) -> Result<String> {
    let certs = request
        .peer_certs()
        .ok_or_else(|| Error::String("no client certificate presented".to_string()))?;
    let leaf = certs
        .first()
        .ok_or_else(|| Error::String("empty peer certificate chain".to_string()))?;
    let digest = Sha1::digest(leaf.get_ref());
    Ok(hex::encode(digest))
}

async fn authenticate_builder<T>(pool: &PgPool, request: &Request<T>) -> Result<Builder> {
    let fingerprint = peer_fingerprint(request)?;
    let mut conn = pool.acquire().await?;
    let builder = db::find_builder_by_transport_fingerprint(&mut conn, &fingerprint)
        .await?
        .ok_or_else(|| Error::String("unauthorized: not a known builder".to_string()))?;
    if builder.is_disabled() {
        return Err(Error::String("unauthorized: builder disabled".to_string()));
    }
    Ok(builder)
}

async fn authenticate_user<T>(pool: &PgPool, request: &Request<T>) -> Result<Person> {
    let fingerprint = peer_fingerprint(request)?;
    let mut conn = pool.acquire().await?;
    let person = db::find_person_by_transport_fingerprint(&mut conn, &fingerprint)
        .await?
        .ok_or_else(|| Error::String("unauthorized: not a known user".to_string()))?;
    if person.is_disabled() {
        return Err(Error::String("unauthorized: user disabled".to_string()));
    }
    Ok(person)
}

/// Strip the `source`/`all` pseudo-arches from a caller's requested arch
/// list before matching it against a Job's real architecture, per the
/// `get_next_job` filter in spec.md §4.4.
fn real_arches(requested: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|a| a.as_str() != ARCH_SOURCE && a.as_str() != ARCH_ALL)
        .cloned()
        .collect()
}

fn to_proto_job(ctx: &db::JobContext, assigned_count: i64) -> ProtoJob {
    ProtoJob {
        id: ctx.job_id,
        check: ctx.check_name.clone(),
        arch: ctx.arch_name.clone(),
        source_name: ctx.source_name.clone(),
        source_version: ctx.source_version.clone(),
        assigned_count,
    }
}

#[async_trait]
impl SchedulerService for PackhouseServer {
    async fn get_next_job(
        &self,
        request: Request<GetNextJobRequest>,
    ) -> std::result::Result<Response<GetNextJobResponse>, Status> {
        let builder = authenticate_builder(&self.pool, &request).await?;
        let req = request.into_inner();

        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        db::touch_builder_last_ping(&mut conn, builder.id)
            .await
            .map_err(Error::from)?;

        if self.is_draining() {
            return Ok(Response::new(GetNextJobResponse { job: None }));
        }

        let arches = real_arches(&req.arches);
        let job = db::dispatch_next_job(
            &mut conn,
            builder.id,
            &req.suites,
            &req.components,
            &req.checks,
            &arches,
        )
        .await
        .map_err(Error::from)?;

        let Some(job) = job else {
            return Ok(Response::new(GetNextJobResponse { job: None }));
        };

        let ctx = db::job_context(&mut conn, job.id).await.map_err(Error::from)?;
        self.events.emit(
            "start",
            "job",
            serde_json::json!({"job": job.id, "builder": builder.name}),
        );
        Ok(Response::new(GetNextJobResponse {
            job: Some(to_proto_job(&ctx, job.assigned_count)),
        }))
    }

    async fn close_job(
        &self,
        request: Request<CloseJobRequest>,
    ) -> std::result::Result<Response<CloseJobResponse>, Status> {
        let builder = authenticate_builder(&self.pool, &request).await?;
        let job_id = request.into_inner().job_id;

        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        let job = db::find_job(&mut conn, job_id).await.map_err(Error::from)?;
        if job.builder_id != Some(builder.id) {
            return Err(Error::String("job is not assigned to this builder".to_string()).into());
        }

        db::close_job(&mut conn, job_id).await.map_err(Error::from)?;
        self.events.emit("complete", "job", serde_json::json!({"job": job_id}));
        Ok(Response::new(CloseJobResponse {}))
    }

    async fn forfeit_job(
        &self,
        request: Request<ForfeitJobRequest>,
    ) -> std::result::Result<Response<ForfeitJobResponse>, Status> {
        let builder = authenticate_builder(&self.pool, &request).await?;
        let job_id = request.into_inner().job_id;

        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        let job = db::find_job(&mut conn, job_id).await.map_err(Error::from)?;
        if job.builder_id != Some(builder.id) {
            return Err(Error::String("job is not assigned to this builder".to_string()).into());
        }

        db::forfeit_job(&mut conn, job_id).await.map_err(Error::from)?;
        self.events.emit("abort", "job", serde_json::json!({"job": job_id}));
        Ok(Response::new(ForfeitJobResponse {}))
    }

    async fn rerun_job(
        &self,
        request: Request<RerunJobRequest>,
    ) -> std::result::Result<Response<RerunJobResponse>, Status> {
        let _user = authenticate_user(&self.pool, &request).await?;
        let job_id = request.into_inner().job_id;

        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        refuse_if_not_rerunnable(&mut conn, job_id).await?;
        db::clear_job_for_rerun(&mut conn, job_id).await.map_err(Error::from)?;
        Ok(Response::new(RerunJobResponse {}))
    }

    async fn rerun_check(
        &self,
        request: Request<RerunCheckRequest>,
    ) -> std::result::Result<Response<RerunCheckResponse>, Status> {
        let _user = authenticate_user(&self.pool, &request).await?;
        let check_name = request.into_inner().check;

        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        let check = db::find_check_by_name(&mut conn, &check_name)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::String(format!("unknown check: {check_name}")))?;
        if check.build {
            return Err(Error::String("rerun_check refuses build checks".to_string()).into());
        }

        let job_ids = db::jobs_for_current_sources_by_check(&mut conn, &check_name)
            .await
            .map_err(Error::from)?;
        for id in &job_ids {
            db::clear_job_for_rerun(&mut conn, *id).await.map_err(Error::from)?;
        }
        Ok(Response::new(RerunCheckResponse {
            jobs_cleared: job_ids.len() as u64,
        }))
    }

    async fn retry_failed(
        &self,
        request: Request<RetryFailedRequest>,
    ) -> std::result::Result<Response<RetryFailedResponse>, Status> {
        let _user = authenticate_user(&self.pool, &request).await?;

        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        let grace = crate::config::DEFAULT_RETRY_FAILED_GRACE_SECS;
        let job_ids = db::stale_failed_build_jobs(&mut conn, chrono::Duration::seconds(grace as i64))
            .await
            .map_err(Error::from)?;
        for id in &job_ids {
            db::clear_job_for_rerun(&mut conn, *id).await.map_err(Error::from)?;
        }
        Ok(Response::new(RetryFailedResponse {
            jobs_cleared: job_ids.len() as u64,
        }))
    }
}

/// Shared refusal logic between `rerun_job` and (indirectly, via its
/// per-job loop) `rerun_check`/`retry_failed`: `rerun_job` alone checks
/// both rules up front, per spec.md §4.4/§9.
async fn refuse_if_not_rerunnable(conn: &mut sqlx::PgConnection, job_id: i64) -> std::result::Result<(), Status> {
    let job: Job = db::find_job(conn, job_id).await.map_err(Error::from)?;
    let check: Check = db::find_check(conn, job.check_id).await.map_err(Error::from)?;
    if check.build && job.has_built_binary() {
        return Err(Error::String(
            "rerun_job refuses successful build jobs (a built binary is present)".to_string(),
        )
        .into());
    }
    if !db::is_latest_source(conn, job.source_id).await.map_err(Error::from)? {
        return Err(Error::String(
            "rerun_job refuses jobs whose source is not the latest version".to_string(),
        )
        .into());
    }
    Ok(())
}

#[async_trait]
impl PrincipalService for PackhouseServer {
    async fn create_user(
        &self,
        request: Request<CreateUserRequest>,
    ) -> std::result::Result<Response<PrincipalReply>, Status> {
        let req = request.into_inner();
        let signing_fingerprint = crate::keyring::import_signing(&self.signing_keyring, &req.signing_key)
            .await
            .map_err(Error::from)?;
        let transport_fingerprint = crate::keyring::import_transport(
            &self.transport_keyring,
            &req.transport_cert,
            Some(&req.name),
            Some(&req.email),
        )
        .await
        .map_err(Error::from)?;

        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        let id = db::insert_person(&mut conn, &req.name, &req.email, &signing_fingerprint, &transport_fingerprint)
            .await
            .map_err(Error::from)?;

        Ok(Response::new(PrincipalReply {
            id,
            signing_fingerprint,
            transport_fingerprint,
        }))
    }

    async fn update_user_keys(
        &self,
        request: Request<UpdateKeysRequest>,
    ) -> std::result::Result<Response<PrincipalReply>, Status> {
        let req = request.into_inner();
        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        let existing = sqlx::query_as::<_, Person>(
            "SELECT id, name, email, signing_fingerprint, transport_fingerprint FROM people WHERE id = $1",
        )
        .bind(req.principal_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::from)?
        .ok_or_else(|| Status::not_found(format!("unknown user: {}", req.principal_id)))?;

        let signing_fingerprint = match req.signing_key {
            Some(bytes) => crate::keyring::import_signing(&self.signing_keyring, &bytes)
                .await
                .map_err(Error::from)?,
            None => existing.signing_fingerprint.clone(),
        };
        let transport_fingerprint = match req.transport_cert {
            Some(bytes) => crate::keyring::import_transport(&self.transport_keyring, &bytes, Some(&existing.name), Some(&existing.email))
                .await
                .map_err(Error::from)?,
            None => existing.transport_fingerprint.clone(),
        };

        db::update_person_keys(&mut conn, req.principal_id, &signing_fingerprint, &transport_fingerprint)
            .await
            .map_err(Error::from)?;

        Ok(Response::new(PrincipalReply {
            id: req.principal_id,
            signing_fingerprint,
            transport_fingerprint,
        }))
    }

    async fn disable_user(
        &self,
        request: Request<DisablePrincipalRequest>,
    ) -> std::result::Result<Response<PrincipalReply>, Status> {
        let principal_id = request.into_inner().principal_id;
        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        db::disable_person(&mut conn, principal_id).await.map_err(Error::from)?;
        Ok(Response::new(PrincipalReply {
            id: principal_id,
            signing_fingerprint: crate::model::DISABLED_SENTINEL.to_string(),
            transport_fingerprint: crate::model::DISABLED_SENTINEL.to_string(),
        }))
    }

    async fn create_builder(
        &self,
        request: Request<CreateBuilderRequest>,
    ) -> std::result::Result<Response<PrincipalReply>, Status> {
        let req = request.into_inner();
        let signing_fingerprint = crate::keyring::import_signing(&self.signing_keyring, &req.signing_key)
            .await
            .map_err(Error::from)?;
        let transport_fingerprint = crate::keyring::import_transport(
            &self.transport_keyring,
            &req.transport_cert,
            Some(&req.name),
            Some(&req.email),
        )
        .await
        .map_err(Error::from)?;

        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        let id = db::insert_builder(&mut conn, &req.name, &req.email, &signing_fingerprint, &transport_fingerprint)
            .await
            .map_err(Error::from)?;

        Ok(Response::new(PrincipalReply {
            id,
            signing_fingerprint,
            transport_fingerprint,
        }))
    }

    async fn update_builder_keys(
        &self,
        request: Request<UpdateKeysRequest>,
    ) -> std::result::Result<Response<PrincipalReply>, Status> {
        let req = request.into_inner();
        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        let existing = sqlx::query_as::<_, Builder>(
            "SELECT id, name, email, signing_fingerprint, transport_fingerprint, last_ping \
             FROM builders WHERE id = $1",
        )
        .bind(req.principal_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::from)?
        .ok_or_else(|| Status::not_found(format!("unknown builder: {}", req.principal_id)))?;

        let signing_fingerprint = match req.signing_key {
            Some(bytes) => crate::keyring::import_signing(&self.signing_keyring, &bytes)
                .await
                .map_err(Error::from)?,
            None => existing.signing_fingerprint.clone(),
        };
        let transport_fingerprint = match req.transport_cert {
            Some(bytes) => crate::keyring::import_transport(&self.transport_keyring, &bytes, Some(&existing.name), Some(&existing.email))
                .await
                .map_err(Error::from)?,
            None => existing.transport_fingerprint.clone(),
        };

        db::update_builder_keys(&mut conn, req.principal_id, &signing_fingerprint, &transport_fingerprint)
            .await
            .map_err(Error::from)?;

        Ok(Response::new(PrincipalReply {
            id: req.principal_id,
            signing_fingerprint,
            transport_fingerprint,
        }))
    }

    async fn disable_builder(
        &self,
        request: Request<DisablePrincipalRequest>,
    ) -> std::result::Result<Response<PrincipalReply>, Status> {
        let principal_id = request.into_inner().principal_id;
        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        db::disable_builder(&mut conn, principal_id).await.map_err(Error::from)?;
        Ok(Response::new(PrincipalReply {
            id: principal_id,
            signing_fingerprint: crate::model::DISABLED_SENTINEL.to_string(),
            transport_fingerprint: crate::model::DISABLED_SENTINEL.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_arches_strips_pseudo_arches() {
        let requested = vec!["amd64".to_string(), "source".to_string(), "all".to_string()];
        assert_eq!(real_arches(&requested), vec!["amd64".to_string()]);
    }
}
