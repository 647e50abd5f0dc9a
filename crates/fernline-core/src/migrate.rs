//! Migration engine for the legacy flat plugin tables.
//!
//! Each descriptor is an independent rename-via-copy of one legacy
//! `sys_plugin_*` table into a schema-qualified destination. The engine
//! is forward-only and idempotent by reclassification: re-running the
//! whole tool is the recovery mechanism, there are no in-process retries
//! and no rollback of completed migrations.

use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::Store;

/// One migration unit: legacy flat table to schema-qualified destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationDescriptor {
    pub source_table: &'static str,
    pub target_schema: &'static str,
    pub target_table: &'static str,
}

/// The canonical plugin-table migrations. A closed, compiled-in set:
/// interpolating these identifiers into SQL is safe only because nothing
/// here is user-supplied. Always passed in explicitly so tests can run
/// fabricated registries.
pub const BUILTIN_MIGRATIONS: &[MigrationDescriptor] = &[
    MigrationDescriptor {
        source_table: "sys_plugin_cashflow_items",
        target_schema: "plugin_cashflow",
        target_table: "scheduled",
    },
    MigrationDescriptor {
        source_table: "sys_plugin_goals",
        target_schema: "plugin_goals",
        target_table: "goals",
    },
    MigrationDescriptor {
        source_table: "sys_plugin_subscriptions",
        target_schema: "plugin_subscriptions",
        target_table: "subscriptions",
    },
    MigrationDescriptor {
        source_table: "sys_plugin_emergency_fund_config",
        target_schema: "plugin_emergency_fund",
        target_table: "config",
    },
    MigrationDescriptor {
        source_table: "sys_plugin_emergency_fund_snapshots",
        target_schema: "plugin_emergency_fund",
        target_table: "snapshots",
    },
];

/// Read-only status of one descriptor before any mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Pending,
    AlreadyDone,
    SourceMissing,
}

/// Classify one descriptor against the live catalog. Never mutates.
///
/// The source check runs first: an absent source is reported as missing
/// even when the destination happens to exist already.
pub fn classify(
    store: &Store,
    descriptor: &MigrationDescriptor,
) -> Result<Classification, StoreError> {
    if !store.table_exists(None, descriptor.source_table)? {
        return Ok(Classification::SourceMissing);
    }
    if store.table_exists(Some(descriptor.target_schema), descriptor.target_table)? {
        return Ok(Classification::AlreadyDone);
    }
    Ok(Classification::Pending)
}

/// Outcome status of one descriptor for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    Migrated,
    AlreadyDone,
    SourceMissing,
    /// Pending, but this is a dry run: nothing was touched.
    DryRun,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub descriptor: MigrationDescriptor,
    pub status: MigrationStatus,
}

impl MigrationOutcome {
    /// One human-readable report line. Dry-run lines are phrased
    /// prospectively; the shape is otherwise identical to a live run.
    pub fn describe(&self) -> String {
        let d = &self.descriptor;
        match &self.status {
            MigrationStatus::Migrated => format!(
                "  ✓ Migrated {} to {}.{}",
                d.source_table, d.target_schema, d.target_table
            ),
            MigrationStatus::DryRun => format!(
                "  → Would migrate {} → {}.{}",
                d.source_table, d.target_schema, d.target_table
            ),
            MigrationStatus::AlreadyDone => format!(
                "  ⊘ {}.{} already exists, skipping",
                d.target_schema, d.target_table
            ),
            MigrationStatus::SourceMissing => {
                format!("  ⊘ {} does not exist, skipping", d.source_table)
            }
            MigrationStatus::Failed(reason) => {
                format!("  ✗ Failed to migrate {}: {}", d.source_table, reason)
            }
        }
    }
}

/// Running tally. Failed and both skip classifications count as skipped;
/// a dry-run "would migrate" counts as migrated so the summary keeps the
/// same shape as the live run it previews.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub migrated: usize,
    pub skipped: usize,
}

/// Accumulated outcomes of one run, in registry order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<MigrationOutcome>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn record(&mut self, outcome: MigrationOutcome) {
        match outcome.status {
            MigrationStatus::Migrated | MigrationStatus::DryRun => self.summary.migrated += 1,
            MigrationStatus::AlreadyDone
            | MigrationStatus::SourceMissing
            | MigrationStatus::Failed(_) => self.summary.skipped += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn any_failed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.status, MigrationStatus::Failed(_)))
    }
}

/// Apply one pending migration: create the destination schema, copy the
/// source table (schema + data in one statement, never an empty shell
/// that fills up later), drop the source.
///
/// DuckDB has transactional DDL, so the three statements run inside one
/// transaction. A failure at any step rolls the whole unit back: the
/// source survives, the destination never exists half-copied, and the
/// next run reclassifies the descriptor as pending.
pub fn apply(store: &Store, descriptor: &MigrationDescriptor) -> MigrationOutcome {
    info!(
        source = descriptor.source_table,
        target_schema = descriptor.target_schema,
        target_table = descriptor.target_table,
        "migrating table"
    );
    match copy_and_drop(store, descriptor) {
        Ok(()) => MigrationOutcome {
            descriptor: *descriptor,
            status: MigrationStatus::Migrated,
        },
        Err(e) => {
            if let Err(rollback_err) = store.execute("ROLLBACK") {
                debug!(error = %rollback_err, "rollback after failed migration");
            }
            warn!(source = descriptor.source_table, error = %e, "migration failed");
            MigrationOutcome {
                descriptor: *descriptor,
                status: MigrationStatus::Failed(e.to_string()),
            }
        }
    }
}

fn copy_and_drop(store: &Store, d: &MigrationDescriptor) -> Result<(), StoreError> {
    store.execute("BEGIN TRANSACTION")?;
    store.execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", d.target_schema))?;
    store.execute(&format!(
        "CREATE TABLE {}.{} AS SELECT * FROM {}",
        d.target_schema, d.target_table, d.source_table
    ))?;
    store.execute(&format!("DROP TABLE {}", d.source_table))?;
    store.execute("COMMIT")?;
    Ok(())
}

/// Drive the whole registry in order: classify each descriptor, apply the
/// pending ones unless `dry_run`, and collect one outcome per entry.
/// A failed descriptor never aborts the run; classification errors are
/// store-level and do.
pub fn run_migrations(
    store: &Store,
    registry: &[MigrationDescriptor],
    dry_run: bool,
) -> Result<RunReport, StoreError> {
    let mut report = RunReport::default();
    for descriptor in registry {
        let classification = classify(store, descriptor)?;
        debug!(
            source = descriptor.source_table,
            ?classification,
            "classified descriptor"
        );
        let outcome = match classification {
            Classification::SourceMissing => MigrationOutcome {
                descriptor: *descriptor,
                status: MigrationStatus::SourceMissing,
            },
            Classification::AlreadyDone => MigrationOutcome {
                descriptor: *descriptor,
                status: MigrationStatus::AlreadyDone,
            },
            Classification::Pending if dry_run => MigrationOutcome {
                descriptor: *descriptor,
                status: MigrationStatus::DryRun,
            },
            Classification::Pending => apply(store, descriptor),
        };
        report.record(outcome);
    }
    Ok(report)
}
