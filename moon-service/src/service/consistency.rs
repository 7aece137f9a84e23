//! # Consistency Checker
//!
//! Startup reconciliation between the schema registry and the live
//! database. Collection creation is two writes (DDL, then registry
//! commit), so a crash between them leaves drift that must be healed
//! before data endpoints are trustworthy.
//!
//! ## Issues
//!
//! | Issue | Meaning |
//! |-------|---------|
//! | `OrphanedRegistry` | registry entry without a table |
//! | `OrphanedTable` | table without a registry entry |
//!
//! System tables (the `moon_` prefix) are excluded from the scan.
//!
//! ## Repair Policy
//!
//! | Issue | AutoRepair | DropOrphans | Action |
//! |-------|-----------|-------------|--------|
//! | OrphanedRegistry | on | - | remove the registry entry |
//! | OrphanedTable | on | off | introspect the table and register it |
//! | OrphanedTable | on | on | `DROP TABLE` |
//! | any | off | - | report only |
//!
//! ## Timeout
//!
//! The whole check runs under `recovery.check_timeout`. On timeout the
//! server stays up but refuses data endpoints and surfaces the degraded
//! state through the health probe.

use std::time::Duration;
use tracing::{info, warn};

use shared::config::RecoveryConfig;
use shared::database::Db;
use shared::errors::{ApiError, ApiResult};
use shared::validation::SYSTEM_PREFIX;

use crate::domain::schema::{Collection, Column};
use crate::service::registry::SchemaRegistry;

// =============================================================================
// Report Model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Registry entry without a backing table
    OrphanedRegistry,
    /// Table without a registry entry
    OrphanedTable,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub kind: IssueKind,
    pub name: String,
    pub repaired: bool,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    pub issues: Vec<Issue>,
}

impl ConsistencyReport {
    pub fn repaired_count(&self) -> usize {
        self.issues.iter().filter(|i| i.repaired).count()
    }

    pub fn unrepaired_count(&self) -> usize {
        self.issues.iter().filter(|i| !i.repaired).count()
    }
}

/// Schema health as surfaced by the status probe and consulted by the
/// data endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// Check completed; any repairable drift was handled per policy
    Ok,
    /// Check timed out or failed; data endpoints are disabled
    Degraded { reason: String },
}

impl SchemaStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

// =============================================================================
// Checker
// =============================================================================

/// Runs the consistency check under the configured timeout and returns the
/// resulting status. Never fails the boot: a broken check degrades the
/// instance instead.
pub async fn check_with_timeout(
    db: &Db,
    registry: &SchemaRegistry,
    policy: &RecoveryConfig,
) -> SchemaStatus {
    let timeout = Duration::from_secs(policy.check_timeout);
    match tokio::time::timeout(timeout, run_check(db, registry, policy)).await {
        Ok(Ok(report)) => {
            if report.issues.is_empty() {
                info!("Schema consistency check passed");
            } else {
                info!(
                    issues = report.issues.len(),
                    repaired = report.repaired_count(),
                    unrepaired = report.unrepaired_count(),
                    "Schema consistency check completed with issues"
                );
            }
            SchemaStatus::Ok
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Schema consistency check failed");
            SchemaStatus::Degraded {
                reason: "consistency check failed".to_string(),
            }
        }
        Err(_) => {
            warn!(timeout_seconds = policy.check_timeout, "Schema consistency check timed out");
            SchemaStatus::Degraded {
                reason: "consistency check timed out".to_string(),
            }
        }
    }
}

/// One reconciliation pass: diff registry names against live tables and
/// apply the repair policy.
pub async fn run_check(
    db: &Db,
    registry: &SchemaRegistry,
    policy: &RecoveryConfig,
) -> ApiResult<ConsistencyReport> {
    let registered = registry.list_names().await;
    let tables: Vec<String> = db
        .list_tables()
        .await?
        .into_iter()
        .filter(|name| !name.starts_with(SYSTEM_PREFIX))
        .collect();

    let mut report = ConsistencyReport::default();

    // Registry entries without tables
    for name in &registered {
        if !tables.contains(name) {
            let mut repaired = false;
            if policy.auto_repair {
                registry.remove(name).await?;
                info!(collection = %name, "Removed orphaned registry entry");
                repaired = true;
            } else {
                warn!(collection = %name, "Orphaned registry entry (auto_repair disabled)");
            }
            report.issues.push(Issue {
                kind: IssueKind::OrphanedRegistry,
                name: name.clone(),
                repaired,
            });
        }
    }

    // Tables without registry entries
    for table in &tables {
        if registered.contains(table) {
            continue;
        }
        let mut repaired = false;
        if policy.auto_repair {
            if policy.drop_orphans {
                let sql = format!("DROP TABLE {}", db.dialect().quote_ident(table));
                db.execute(&sql, &[]).await?;
                info!(table = %table, "Dropped orphaned table");
                repaired = true;
            } else {
                match infer_collection(db, table).await {
                    Ok(collection) => {
                        registry.set(collection).await?;
                        info!(table = %table, "Registered orphaned table");
                        repaired = true;
                    }
                    Err(e) => {
                        warn!(table = %table, error = %e, "Could not infer schema for orphaned table");
                    }
                }
            }
        } else {
            warn!(table = %table, "Orphaned table (auto_repair disabled)");
        }
        report.issues.push(Issue {
            kind: IssueKind::OrphanedTable,
            name: table.clone(),
            repaired,
        });
    }

    Ok(report)
}

/// Rebuilds a column list from the database catalog. System columns are
/// skipped; the result is best-effort (defaults and uniqueness are not
/// recoverable portably).
async fn infer_collection(db: &Db, table: &str) -> ApiResult<Collection> {
    let introspected = db.table_columns(table).await?;
    if introspected.is_empty() {
        return Err(ApiError::internal(format!(
            "table '{}' has no introspectable columns",
            table
        )));
    }

    let columns: Vec<Column> = introspected
        .iter()
        .filter(|c| c.name != "pkid" && c.name != "id")
        .map(|c| Column {
            name: c.name.clone(),
            column_type: db.dialect().infer_column_type(&c.db_type),
            nullable: c.nullable,
            default_value: None,
            unique: false,
        })
        .collect();

    if columns.is_empty() {
        return Err(ApiError::internal(format!(
            "table '{}' has no user columns",
            table
        )));
    }

    Ok(Collection {
        name: table.to_string(),
        columns,
    })
}
