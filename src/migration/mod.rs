pub mod admin;
pub mod executor;
pub mod result;
pub mod snapshot;
pub mod splitter;
pub mod verifier;

use std::error::Error as StdError;
use std::time::Instant;

use log::{error, info, warn, Level};
use logging_timer::timer;
use rusqlite::Connection;
use serde_json::json;

use crate::activity_log::{ActivityEntry, ActivityLog};
use crate::employees::{Employees, ROLE_ADMIN};
use crate::error::WashDeskError;
use crate::schema::RequiredSchema;

use admin::{AdminCheck, AdminEnforcer};
use executor::{ExecutionSummary, Executor};
use result::MigrationResult;
use snapshot::{Backup, SnapshotStore};
use splitter::StatementSplitter;
use verifier::SchemaVerifier;

pub const AUDIT_ACTION: &str = "database_update";
pub const PROMOTION_ACTION: &str = "assign_admin";

const PROMOTION_TEXT: &str = "Default admin role assigned to first active employee";

/// The schema update shipped with the binary.
pub const UPDATE_SCHEMA_SQL: &str = include_str!("../../sql/update_schema.sql");

/// The migration's unit of work.
///
/// Dropping it without calling `commit` rolls the transaction back.
struct MigrationTx<'a> {
    conn: &'a Connection,
    open: bool,
}

impl<'a> MigrationTx<'a> {
    fn begin(conn: &'a Connection) -> Result<Self, WashDeskError> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(MigrationTx { conn, open: true })
    }

    fn commit(mut self) -> Result<(), WashDeskError> {
        self.conn.execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }
}

impl Drop for MigrationTx<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!("Rolling back migration transaction");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                error!("Rollback failed: {}", e);
            }
        }
    }
}

/// Runs one migration: backup, execute, verify, enforce, commit, audit.
///
/// Any fatal error after the backup rolls the transaction back and replays
/// the backup. `run` never fails; everything that happened is in the
/// returned `MigrationResult`.
pub struct Migrator<'a> {
    conn: &'a mut Connection,
    store: &'a SnapshotStore,
    required: &'a RequiredSchema,
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a mut Connection, store: &'a SnapshotStore, required: &'a RequiredSchema) -> Self {
        Migrator {
            conn,
            store,
            required,
        }
    }

    pub fn run(&mut self, source: &str, admin_id: i64) -> MigrationResult {
        let _tmr = timer!(Level::Debug; "Migrator::run", "admin {}", admin_id);
        let start = Instant::now();
        let mut result = MigrationResult::new();

        if let Err(e) = Employees::require_admin(&*self.conn, admin_id) {
            warn!("Migration refused: {}", e);
            Self::record_fatal(&mut result, &e);
            result.finish(start.elapsed());
            return result;
        }

        let backup = match self.store.capture(&*self.conn) {
            Ok(backup) => backup,
            Err(e) => {
                error!("Migration aborted before any change: {}", e);
                Self::record_fatal(&mut result, &e);
                result.finish(start.elapsed());
                return result;
            }
        };
        result.success(
            "Database backup created successfully",
            Some(backup.path.display().to_string()),
        );
        result.set_backup_path(backup.path.clone());

        match self.apply(source, &mut result) {
            Ok((summary, admin_check)) => {
                result.set_counts(summary.executed, summary.total);
                info!("Migration committed: executed {} of {} statements", summary.executed, summary.total);
                self.audit(admin_id, &summary, &admin_check);
            }
            Err(e) => {
                error!("Migration failed: {}", e);
                Self::record_fatal(&mut result, &e);
                self.recover(&backup, &mut result);
            }
        }

        result.finish(start.elapsed());
        result
    }

    /// Everything between BEGIN and COMMIT.
    fn apply(
        &self,
        source: &str,
        result: &mut MigrationResult,
    ) -> Result<(ExecutionSummary, AdminCheck), WashDeskError> {
        let conn = &*self.conn;
        let tx = MigrationTx::begin(conn)?;

        let summary = Executor::run(tx.conn, StatementSplitter::new(source), result)?;

        for finding in SchemaVerifier::verify(conn, self.required)? {
            result.warning(finding.message(), Some(finding.detail()));
        }

        let admin_check = AdminEnforcer::ensure_admin_exists(conn)?;
        match &admin_check {
            AdminCheck::Present(_) => {}
            AdminCheck::Promoted { employee_id, .. } => {
                result.warning(PROMOTION_TEXT, Some(format!("employee {}", employee_id)))
            }
            AdminCheck::NoCandidate => {
                result.warning("No active employee found to assign the admin role", None)
            }
        }

        tx.commit()?;
        Ok((summary, admin_check))
    }

    /// Audit a committed run. Failures here are logged and never undo the run.
    fn audit(&self, admin_id: i64, summary: &ExecutionSummary, admin_check: &AdminCheck) {
        let conn = &*self.conn;

        let details = format!(
            "Database update completed. Executed {} of {} queries",
            summary.executed, summary.total
        );
        if let Err(e) = ActivityLog::log(conn, admin_id, AUDIT_ACTION, &details) {
            error!("{}", e);
        }

        if let AdminCheck::Promoted {
            employee_id,
            previous_role,
        } = admin_check
        {
            let entry = ActivityEntry::new(admin_id, PROMOTION_ACTION, PROMOTION_TEXT)
                .with_entity("employees", *employee_id)
                .with_values(
                    Some(json!({ "role": previous_role })),
                    Some(json!({ "role": ROLE_ADMIN })),
                );
            if let Err(e) = ActivityLog::record(conn, &entry) {
                error!("{}", e);
            }
        }
    }

    /// Replay the backup after the transaction has been rolled back.
    fn recover(&mut self, backup: &Backup, result: &mut MigrationResult) {
        let report = SnapshotStore::restore(self.conn, &backup.snapshot);

        match report.first_error() {
            None => result.success(
                "Database restored from backup",
                Some(backup.path.display().to_string()),
            ),
            Some(e) => result.error(format!("Failed to restore database: {}", e), None),
        }
        result.set_restore(report);
    }

    fn record_fatal(result: &mut MigrationResult, err: &WashDeskError) {
        result.error(format!("Critical Error: {}", err), Some(error_chain(err)));
    }
}

/// The error and each of its sources, one per line.
fn error_chain(err: &dyn StdError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str("\ncaused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
