// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! `packhouse-remote`: a thin client wrapping the user-only and
//! administrative RPCs of spec.md §4.4 — job rerun/retry and principal
//! management — connecting to the `serve` process over the same mutually-
//! authenticated TLS transport workers use.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use packhouse_cli_common as cli;
use packhouse_proto::principals::principal_service_client::PrincipalServiceClient;
use packhouse_proto::principals::{
    CreateBuilderRequest, CreateUserRequest, DisablePrincipalRequest, UpdateKeysRequest,
};
use packhouse_proto::scheduler::scheduler_service_client::SchedulerServiceClient;
use packhouse_proto::scheduler::{RerunCheckRequest, RerunJobRequest, RetryFailedRequest};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};

#[derive(Debug, Parser)]
#[command(about = "Administrative client for a packhouse scheduler server")]
struct Cli {
    #[clap(flatten)]
    logging: cli::Logging,

    #[clap(long, short, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Clear a job's (failed, builder, assigned_at, finished_at) fields so
    /// it is dispatched again. Refused for successful build jobs or jobs
    /// whose source is no longer the latest version.
    RerunJob { job_id: i64 },
    /// Apply `RerunJob`'s clear to every job of a non-build check whose
    /// source is current.
    RerunCheck { check: String },
    /// Apply the clear to every build job that produced no binary and has
    /// sat finished longer than the configured grace period.
    RetryFailed,
    /// Register a new uploader, importing their signing key and transport
    /// certificate into the keyrings.
    CreateUser {
        name: String,
        email: String,
        #[clap(long, value_hint = clap::ValueHint::FilePath)]
        signing_key: PathBuf,
        #[clap(long, value_hint = clap::ValueHint::FilePath)]
        transport_cert: PathBuf,
    },
    /// Replace a user's signing key and/or transport certificate.
    UpdateUserKeys {
        principal_id: i64,
        #[clap(long, value_hint = clap::ValueHint::FilePath)]
        signing_key: Option<PathBuf>,
        #[clap(long, value_hint = clap::ValueHint::FilePath)]
        transport_cert: Option<PathBuf>,
    },
    /// Disable a user: both fingerprints are set to the sentinel so no
    /// certificate or key matches them again.
    DisableUser { principal_id: i64 },
    /// Register a new builder.
    CreateBuilder {
        name: String,
        email: String,
        #[clap(long, value_hint = clap::ValueHint::FilePath)]
        signing_key: PathBuf,
        #[clap(long, value_hint = clap::ValueHint::FilePath)]
        transport_cert: PathBuf,
    },
    /// Replace a builder's signing key and/or transport certificate.
    UpdateBuilderKeys {
        principal_id: i64,
        #[clap(long, value_hint = clap::ValueHint::FilePath)]
        signing_key: Option<PathBuf>,
        #[clap(long, value_hint = clap::ValueHint::FilePath)]
        transport_cert: Option<PathBuf>,
    },
    /// Disable a builder.
    DisableBuilder { principal_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    // Safety: nothing else runs before this in `main`.
    unsafe {
        cli::pin_locale();
        args.logging.configure();
    }

    let config = cli::load_config(args.config.as_deref())?;
    let channel = connect(&config).await?;

    match args.command {
        Command::RerunJob { job_id } => {
            SchedulerServiceClient::new(channel)
                .rerun_job(RerunJobRequest { job_id })
                .await?;
            println!("job {job_id} cleared for rerun");
        }
        Command::RerunCheck { check } => {
            let resp = SchedulerServiceClient::new(channel)
                .rerun_check(RerunCheckRequest { check: check.clone() })
                .await?
                .into_inner();
            println!("{} job(s) of check '{check}' cleared for rerun", resp.jobs_cleared);
        }
        Command::RetryFailed => {
            let resp = SchedulerServiceClient::new(channel)
                .retry_failed(RetryFailedRequest {})
                .await?
                .into_inner();
            println!("{} stale build job(s) cleared for retry", resp.jobs_cleared);
        }
        Command::CreateUser { name, email, signing_key, transport_cert } => {
            let reply = PrincipalServiceClient::new(channel)
                .create_user(CreateUserRequest {
                    name,
                    email,
                    signing_key: std::fs::read(signing_key)?,
                    transport_cert: std::fs::read(transport_cert)?,
                })
                .await?
                .into_inner();
            println!("created user {} ({})", reply.id, reply.signing_fingerprint);
        }
        Command::UpdateUserKeys { principal_id, signing_key, transport_cert } => {
            let reply = PrincipalServiceClient::new(channel)
                .update_user_keys(UpdateKeysRequest {
                    principal_id,
                    signing_key: signing_key.map(std::fs::read).transpose()?,
                    transport_cert: transport_cert.map(std::fs::read).transpose()?,
                })
                .await?
                .into_inner();
            println!("updated user {} ({})", reply.id, reply.signing_fingerprint);
        }
        Command::DisableUser { principal_id } => {
            PrincipalServiceClient::new(channel)
                .disable_user(DisablePrincipalRequest { principal_id })
                .await?;
            println!("disabled user {principal_id}");
        }
        Command::CreateBuilder { name, email, signing_key, transport_cert } => {
            let reply = PrincipalServiceClient::new(channel)
                .create_builder(CreateBuilderRequest {
                    name,
                    email,
                    signing_key: std::fs::read(signing_key)?,
                    transport_cert: std::fs::read(transport_cert)?,
                })
                .await?
                .into_inner();
            println!("created builder {} ({})", reply.id, reply.signing_fingerprint);
        }
        Command::UpdateBuilderKeys { principal_id, signing_key, transport_cert } => {
            let reply = PrincipalServiceClient::new(channel)
                .update_builder_keys(UpdateKeysRequest {
                    principal_id,
                    signing_key: signing_key.map(std::fs::read).transpose()?,
                    transport_cert: transport_cert.map(std::fs::read).transpose()?,
                })
                .await?
                .into_inner();
            println!("updated builder {} ({})", reply.id, reply.signing_fingerprint);
        }
        Command::DisableBuilder { principal_id } => {
            PrincipalServiceClient::new(channel)
                .disable_builder(DisablePrincipalRequest { principal_id })
                .await?;
            println!("disabled builder {principal_id}");
        }
    }

    Ok(())
}

/// Connect to `config.listen` over TLS, presenting the operator's own
/// client certificate (reusing the server's TLS key pair, since this CLI
/// is only ever run by a trusted operator on the same host or over a
/// private network) and trusting the configured trust anchor.
async fn connect(config: &packhouse_core::config::Config) -> anyhow::Result<Channel> {
    let cert = tokio::fs::read(&config.tls.cert).await?;
    let key = tokio::fs::read(&config.tls.key).await?;
    let trust_anchor = tokio::fs::read(&config.tls.trust_anchor).await?;

    let tls = ClientTlsConfig::new()
        .identity(Identity::from_pem(cert, key))
        .ca_certificate(Certificate::from_pem(trust_anchor));

    let endpoint = Endpoint::from_shared(format!("https://{}", config.listen))?.tls_config(tls)?;
    Ok(endpoint.connect().await?)
}
