// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared command-line plumbing for the four packhouse binaries
//! (`init-database`, `ingest-directory`, `serve`, `remote`): logging setup
//! and config-file loading. Grounded on `spfs-cli-common::args::Logging`,
//! stripped of the `miette`/`sentry` integration that crate depends on.

use std::path::PathBuf;

use tracing_subscriber::prelude::*;

const PACKHOUSE_LOG: &str = "PACKHOUSE_LOG";

/// Command line flags for configuring logging, shared by every binary.
#[derive(Debug, Clone, clap::Args)]
pub struct Logging {
    /// Make output more verbose, can be specified more than once.
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Additionally log output to the provided file.
    #[clap(long, global = true, env = "PACKHOUSE_LOG_FILE", value_hint = clap::ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Log to syslog instead of stderr, for the long-running `serve` process.
    #[clap(long, global = true)]
    pub syslog: bool,
}

impl Logging {
    fn show_target(&self) -> bool {
        self.verbose > 2
    }

    /// Configure the global `tracing` subscriber based on these flags.
    ///
    /// # Safety
    ///
    /// Sets the `PACKHOUSE_LOG` environment variable; see
    /// [`std::env::set_var`] for the applicable safety requirements. The
    /// caller must ensure no other thread is reading or writing the
    /// environment concurrently, which holds for every one of this crate's
    /// binaries since this is called once at the top of `main` before
    /// spawning anything.
    pub unsafe fn configure(&self) {
        let mut filter = match self.verbose {
            0 => std::env::var(PACKHOUSE_LOG).unwrap_or_else(|_| "packhouse=info,warn".to_string()),
            1 => "packhouse=debug,info".to_string(),
            2 => "packhouse=trace,info".to_string(),
            _ => "trace".to_string(),
        };
        // Safety: the responsibility of the caller, see above.
        unsafe {
            std::env::set_var(PACKHOUSE_LOG, &filter);
        }
        if let Ok(overrides) = std::env::var("RUST_LOG") {
            filter.push(',');
            filter.push_str(&overrides);
        }

        let env_filter = move || tracing_subscriber::filter::EnvFilter::new(filter.clone());
        let fmt_layer = || tracing_subscriber::fmt::layer().with_target(self.show_target());

        #[cfg(unix)]
        let syslog_layer = self.syslog.then(|| {
            let identity = c"packhouse";
            let (options, facility) = Default::default();
            let writer = syslog_tracing::Syslog::new(identity, options, facility)
                .expect("initialize syslog");
            fmt_layer().with_writer(writer).with_filter(env_filter())
        });
        #[cfg(not(unix))]
        let syslog_layer = false.then(fmt_layer);

        let stderr_layer = (!self.syslog).then(|| {
            fmt_layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter())
        });

        let file_layer = self.log_file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .ok()
        }).map(|file| fmt_layer().with_writer(file).with_filter(env_filter()));

        tracing_subscriber::registry()
            .with(syslog_layer)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    }
}

/// Pin `LANG`/`LC_ALL` to `C`, matching every entry point's locale handling.
///
/// # Safety
///
/// Same requirements as [`Logging::configure`]: call once, before any other
/// thread exists.
pub unsafe fn pin_locale() {
    unsafe {
        std::env::set_var("LANG", "C");
        std::env::set_var("LC_ALL", "C");
    }
}

/// Load configuration from the path given on the command line, or fall back
/// to the fixed search order in [`packhouse_core::config::Config::load`].
pub fn load_config(explicit: Option<&std::path::Path>) -> anyhow::Result<packhouse_core::config::Config> {
    Ok(packhouse_core::config::Config::load(explicit)?)
}
