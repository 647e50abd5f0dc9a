//! fernline-migrate: one-time migration of legacy `sys_plugin_*` tables
//! into their schema-qualified homes.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use fernline_core::encryption::{resolve_key, StoreMode};
use fernline_core::migrate::{run_migrations, RunReport, BUILTIN_MIGRATIONS};
use fernline_core::paths;
use fernline_core::store::Store;

#[derive(Parser)]
#[command(
    name = "fernline-migrate",
    version,
    about = "Migrate legacy plugin tables to schema-qualified names",
    long_about = None
)]
struct Cli {
    /// Use the demo database (unencrypted)
    #[arg(long)]
    demo: bool,

    /// Show what would be done without making changes
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(report) if report.any_failed() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<RunReport> {
    println!();
    println!("Community Plugin Table Migration");
    println!("{}", "=".repeat(40));
    println!(
        "Database: {}",
        if cli.demo {
            paths::DEMO_DB_FILENAME
        } else {
            paths::DB_FILENAME
        }
    );
    if cli.dry_run {
        println!("Mode: DRY RUN (no changes will be made)");
    }
    println!();

    let data_dir = paths::data_dir().context("resolve data directory")?;
    let mode = if cli.demo {
        StoreMode::Plain
    } else {
        StoreMode::Encrypted
    };

    // Fatal preconditions (missing password, unreadable metadata) abort
    // here, before any table is touched.
    let key = resolve_key(mode, &data_dir).context("resolve store credentials")?;

    let db_path = paths::db_path(&data_dir, cli.demo);
    tracing::debug!(path = %db_path.display(), dry_run = cli.dry_run, "opening store");
    let store = match mode {
        StoreMode::Plain => Store::open_plain(&db_path),
        StoreMode::Encrypted => Store::open_encrypted(&db_path, &key),
    }
    .with_context(|| format!("open store at {}", db_path.display()))?;

    // Close on every exit path, including a store-level error mid-run.
    let result = run_migrations(&store, BUILTIN_MIGRATIONS, cli.dry_run);
    let close_result = store.close();
    let report = result.context("run migrations")?;
    close_result.context("close store")?;

    for outcome in &report.outcomes {
        println!("{}", outcome.describe());
    }
    println!();
    println!("{}", "=".repeat(40));
    println!(
        "Migrated: {}, Skipped: {}",
        report.summary.migrated, report.summary.skipped
    );

    Ok(report)
}
