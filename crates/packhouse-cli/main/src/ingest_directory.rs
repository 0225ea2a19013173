// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! `packhouse-ingest-directory`: walks a spool directory belonging to one
//! archive group, dispatching every `*.changes` file through
//! [`packhouse_core::ingest::accept_changes`] and every `*.dud` file
//! through [`packhouse_core::ingest::dud::accept_dud`] (spec.md §6), then
//! runs the pruning pass (spec.md §3 "Lifecycle"). Individual rejections
//! are logged, not fatal: the process exits 0 on a clean pass over the
//! directory regardless of how many uploads it rejected.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use packhouse_cli_common as cli;
use packhouse_core::archive::{LocalFileRepo, RepreproRepo};
use packhouse_core::events::LogSink;
use packhouse_core::ingest::{accept_changes, dud, prune, IngestContext, DEFAULT_DUD_FILE_MODE};

#[derive(Debug, Parser)]
#[command(about = "Ingest a spool directory of changes/dud uploads for one archive group")]
struct Cli {
    #[clap(flatten)]
    logging: cli::Logging,

    #[clap(long, short, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Archive group this spool directory belongs to.
    #[clap(long, default_value = "default")]
    group: String,

    /// Directory to scan for `*.changes` and `*.dud` files; not recursed.
    spool: PathBuf,
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
    let pool = sqlx::PgPool::connect(&config.database_url).await?;

    let paths = packhouse_core::resolve_group_paths(&pool, &config.archive, &args.group)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown group: {}", args.group))?;

    let ctx = IngestContext {
        pool: pool.clone(),
        repo: Arc::new(RepreproRepo::new(paths.repo_path.clone())),
        file_repo: Arc::new(LocalFileRepo::new(paths.files_path.clone())),
        signing_keyring: config.keyrings.signing.clone(),
        events: Arc::new(LogSink),
        affinity: config.affinity.clone(),
        dud_file_mode: DEFAULT_DUD_FILE_MODE,
    };

    let mut entries: Vec<_> = walkdir::WalkDir::new(&args.spool)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .collect();
    entries.sort_by_key(|e| e.path().to_path_buf());

    for entry in &entries {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let outcome = match ext {
            "changes" => accept_changes(&ctx, path).await,
            "dud" => dud::accept_dud(&ctx, path).await,
            _ => continue,
        };
        match outcome {
            Ok(id) => tracing::info!(path = %path.display(), id, "ingested"),
            Err(err) => tracing::warn!(path = %path.display(), %err, "ingest failed"),
        }
    }

    match prune::prune(&ctx, &paths.repo_path).await {
        Ok(removed) if !removed.is_empty() => {
            tracing::info!(count = removed.len(), "pruned sources no longer in the archive")
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(%err, "prune pass failed"),
    }

    Ok(())
}
