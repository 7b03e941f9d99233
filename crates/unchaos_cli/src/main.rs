//! `unchaos` command-line entry point.
//!
//! # Responsibility
//! - Resolve configuration, start logging and open the database.
//! - Dispatch subcommands to core services.
//!
//! # Invariants
//! - The process exits non-zero only when configuration or database
//!   bootstrap fails. Command errors are reported on stderr.

mod cli;
mod commands;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::Cli;
use std::path::{Path, PathBuf};
use unchaos_core::{default_config_path, default_log_level, init_logging, open_db, AppConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()
            .ok_or_else(|| anyhow!("cannot locate home directory; pass --config"))?,
    };
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("cannot load config `{}`", config_path.display()))?;

    start_logging(&config);

    let mut conn = open_db(&config.database_path).with_context(|| {
        format!(
            "cannot open database `{}`",
            config.database_path.display()
        )
    })?;

    if let Err(err) = commands::run(cli.command, &mut conn, &config) {
        eprintln!("error: {err:#}");
    }
    Ok(())
}

/// File logging is best effort; the command still runs without it.
fn start_logging(config: &AppConfig) {
    let level = config
        .logging
        .level
        .as_deref()
        .unwrap_or(default_log_level());
    let log_dir = absolute(&config.log_dir());
    if let Err(err) = init_logging(level, &log_dir) {
        eprintln!("warning: file logging disabled: {err}");
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
