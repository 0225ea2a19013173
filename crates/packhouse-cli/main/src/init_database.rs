// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! `packhouse-init-database`: runs the schema migrations against a fresh
//! database, then applies a YAML seed naming the archive's checks, groups,
//! and the suites each group builds for (spec.md §6).

use std::path::PathBuf;

use clap::Parser;
use packhouse_cli_common as cli;
use packhouse_core::seed::Seed;

#[derive(Debug, Parser)]
#[command(about = "Initialize a packhouse database from a YAML seed")]
struct Cli {
    #[clap(flatten)]
    logging: cli::Logging,

    /// Path to the packhouse config file; falls back to the fixed search
    /// order (explicit, ~/.packhouse.yaml, /etc/packhouse/config.yaml).
    #[clap(long, short, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// YAML file naming checks, groups, and the group/suite enablement.
    seed: PathBuf,
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
    packhouse_core::migrate(&pool).await?;

    let text = std::fs::read_to_string(&args.seed)?;
    let seed = Seed::from_yaml(&text)?;
    packhouse_core::seed::apply(&pool, &seed).await?;

    tracing::info!(
        seed = %args.seed.display(),
        groups = seed.groups.len(),
        checks = seed.checks.len(),
        "database initialized",
    );
    Ok(())
}
