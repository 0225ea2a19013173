// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Background sweeps required by spec.md §5 ("Cancellation and timeouts")
//! but not exposed as an RPC method. Grounded on the graceful-shutdown
//! pattern of `spfs-cli/main::cmd_server`: a loop task started alongside the
//! gRPC server and joined against the same drain signal, rather than a
//! thread-local timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::events::EventSink;
use crate::{db, Result};

/// How often the sweep queries run. Not externally configurable: the three
/// sweeps below each carry their own threshold, and running them more often
/// than this only adds load without changing behavior.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the three periodic sweeps until `shutdown` is set, then returns.
/// Intended to be `tokio::spawn`ed alongside `tonic::transport::Server`'s
/// `serve_with_shutdown` future.
pub async fn run(
    pool: PgPool,
    events: Arc<dyn EventSink>,
    dispatch_timeout: chrono::Duration,
    shutdown: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        if let Err(err) = sweep_once(&pool, events.as_ref(), dispatch_timeout).await {
            tracing::error!(err = ?err, "reaper sweep failed");
        }
    }
}

async fn sweep_once(
    pool: &PgPool,
    events: &dyn EventSink,
    dispatch_timeout: chrono::Duration,
) -> Result<()> {
    let mut conn = pool.acquire().await?;

    for job_id in db::timed_out_jobs(&mut conn, dispatch_timeout).await? {
        db::forfeit_job(&mut conn, job_id).await?;
        events.emit("timeout", "job", serde_json::json!({"job": job_id}));
        tracing::warn!(job = job_id, "reaper: forfeited timed-out job");
    }

    for job_id in db::missing_diagnostic_jobs(&mut conn).await? {
        db::clear_job_for_rerun(&mut conn, job_id).await?;
        events.emit("reschedule", "job", serde_json::json!({"job": job_id, "reason": "missing-diagnostic"}));
        tracing::warn!(job = job_id, "reaper: rescheduled job missing its diagnostic bundle");
    }

    for job_id in db::missing_binary_jobs(&mut conn).await? {
        db::clear_job_for_rerun(&mut conn, job_id).await?;
        events.emit("reschedule", "job", serde_json::json!({"job": job_id, "reason": "missing-binary"}));
        tracing::warn!(job = job_id, "reaper: rescheduled reported build with no binary");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_interval_is_shorter_than_any_threshold() {
        assert!(SWEEP_INTERVAL < Duration::from_secs(24 * 3600));
    }
}
