// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! `packhouse-serve`: runs the authenticated RPC surface (spec.md §4.4)
//! over mutually-authenticated TLS, alongside the background reaper
//! (spec.md §5). A drain is requested by `SIGINT`/`SIGTERM`: `get_next_job`
//! starts returning no job immediately, and the process exits once every
//! currently-assigned-but-unfinished job has finished (spec.md §6).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use packhouse_cli_common as cli;
use packhouse_core::events::{EventSink, LogSink};
use packhouse_core::scheduler::PackhouseServer;
use packhouse_proto::principals::principal_service_server::PrincipalServiceServer;
use packhouse_proto::scheduler::scheduler_service_server::SchedulerServiceServer;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};

#[derive(Debug, Parser)]
#[command(about = "Run the packhouse scheduler and principal-management RPC server")]
struct Cli {
    #[clap(flatten)]
    logging: cli::Logging,

    #[clap(long, short, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,
}

/// How often the drain loop re-checks for outstanding assigned jobs once a
/// shutdown has been requested.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    // Safety: nothing else runs before this in `main`.
    unsafe {
        cli::pin_locale();
        args.logging.configure();
    }

    let config = cli::load_config(args.config.as_deref())?;
    let pool = sqlx::PgPool::connect(&config.database_url).await?;
    packhouse_core::migrate(&pool).await?;

    let cert = tokio::fs::read(&config.tls.cert).await?;
    let key = tokio::fs::read(&config.tls.key).await?;
    let trust_anchor = tokio::fs::read(&config.tls.trust_anchor).await?;
    let tls = ServerTlsConfig::new()
        .identity(Identity::from_pem(cert, key))
        .client_ca_root(Certificate::from_pem(trust_anchor));

    let shutdown = Arc::new(AtomicBool::new(false));
    let events: Arc<dyn EventSink> = Arc::new(LogSink);

    let server = PackhouseServer {
        pool: pool.clone(),
        events: events.clone(),
        signing_keyring: config.keyrings.signing.clone(),
        transport_keyring: config.keyrings.transport.clone(),
        shutdown: shutdown.clone(),
    };

    let reaper_pool = pool.clone();
    let reaper_events = events.clone();
    let reaper_shutdown = shutdown.clone();
    let dispatch_timeout = config.dispatch_timeout();
    let reaper_handle = tokio::spawn(async move {
        packhouse_core::reaper::run(reaper_pool, reaper_events, dispatch_timeout, reaper_shutdown).await;
    });

    let drain_future = drain_on_signal(pool.clone(), shutdown.clone());

    tracing::info!(addr = %config.listen, "packhouse-serve listening");
    Server::builder()
        .tls_config(tls)?
        .add_service(SchedulerServiceServer::new(server.clone()))
        .add_service(PrincipalServiceServer::new(server))
        .serve_with_shutdown(config.listen, drain_future)
        .await?;

    reaper_handle.await?;
    tracing::info!("drain complete, exiting");
    Ok(())
}

/// Wait for a termination signal, flip the shutdown flag so `get_next_job`
/// stops dispatching (spec.md §4.4), then poll until no job is currently
/// assigned-but-unfinished before letting the server future resolve.
async fn drain_on_signal(pool: sqlx::PgPool, shutdown: Arc<AtomicBool>) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("install SIGTERM handler");
    #[cfg(unix)]
    let signalled = async {
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    };
    #[cfg(not(unix))]
    let signalled = async {
        let _ = ctrl_c.await;
    };
    signalled.await;

    tracing::info!("drain requested, waiting for assigned jobs to finish");
    shutdown.store(true, Ordering::SeqCst);

    loop {
        let outstanding = packhouse_core::count_assigned_unfinished_jobs(&pool)
            .await
            .unwrap_or(0);
        if outstanding == 0 {
            return;
        }
        tracing::info!(outstanding, "drain: waiting on assigned jobs");
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}
