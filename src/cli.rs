use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

use crate::activity_log::ActivityLog;
use crate::config::Config;
use crate::database::Database;
use crate::error::WashDeskError;
use crate::migration::result::MigrationResult;
use crate::migration::snapshot::{RestoreOutcome, RestoreReport, Snapshot, SnapshotStore};
use crate::migration::verifier::SchemaVerifier;
use crate::migration::{Migrator, UPDATE_SCHEMA_SQL};
use crate::schema::EMPLOYEE_SCHEMA;
use crate::utils::Utils;

#[derive(Parser)]
#[command(
    name = "washdesk",
    version,
    about = "WashDesk: car wash back office database maintenance"
)]
pub struct Cli {
    /// Database file (overrides database.path from the config)
    #[arg(long = "db", global = true)]
    pub db: Option<PathBuf>,

    /// Backup directory (overrides database.backup_dir from the config)
    #[arg(long = "backup-dir", global = true)]
    pub backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the database and base tables if they don't exist
    Init,

    /// Back up the database and apply a schema update
    Migrate {
        /// Id of the administrator running the update
        #[arg(long = "admin")]
        admin: i64,

        /// SQL script to apply (default: migration.source from the config, or the bundled update)
        #[arg(long = "source", short = 's')]
        source: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },

    /// Check the database structure against the required schema
    Verify {
        /// Print findings as JSON
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },

    /// List backups, newest first
    Backups,

    /// Replace the database contents with a backup
    Restore {
        /// Backup file to restore
        #[arg(long = "backup", short = 'b')]
        backup: PathBuf,
    },

    /// Show recent activity log entries
    Activity {
        /// Number of entries to show
        #[arg(long = "limit", short = 'n', default_value_t = 20)]
        limit: u32,
    },
}

impl Cli {
    pub fn handle_command_line(config: &Config) -> Result<(), WashDeskError> {
        let args = Cli::parse();
        let stdout = io::stdout();
        args.execute(config, &mut stdout.lock())
    }

    pub fn execute(&self, config: &Config, out: &mut dyn Write) -> Result<(), WashDeskError> {
        let db_path = self.db.clone().unwrap_or_else(|| config.database.path.clone());
        let backup_dir = self
            .backup_dir
            .clone()
            .unwrap_or_else(|| config.database.backup_dir.clone());

        match &self.command {
            Command::Init => {
                Database::open(&db_path)?;
                writeln!(out, "Database ready at {}", db_path.display())?;
                Ok(())
            }
            Command::Migrate {
                admin,
                source,
                json,
            } => {
                let source_path = source.clone().or_else(|| config.migration.source.clone());
                let sql = match &source_path {
                    Some(path) => fs::read_to_string(path).map_err(|e| {
                        WashDeskError::Error(format!("Could not read {}: {}", path.display(), e))
                    })?,
                    None => UPDATE_SCHEMA_SQL.to_owned(),
                };

                let mut db = Database::open(&db_path)?;
                let store = SnapshotStore::new(backup_dir);
                let result = Migrator::new(db.conn_mut(), &store, &EMPLOYEE_SCHEMA).run(&sql, *admin);

                if *json {
                    serde_json::to_writer_pretty(&mut *out, &result)?;
                    writeln!(out)?;
                } else {
                    Self::print_migration(out, &result)?;
                }

                if result.is_success() {
                    Ok(())
                } else {
                    Err(WashDeskError::Error("Database update failed".to_owned()))
                }
            }
            Command::Verify { json } => {
                let db = Database::open_existing(&db_path)?;
                let findings = SchemaVerifier::verify(db.conn(), &EMPLOYEE_SCHEMA)?;

                if *json {
                    serde_json::to_writer_pretty(&mut *out, &findings)?;
                    writeln!(out)?;
                } else if findings.is_empty() {
                    writeln!(out, "Schema OK")?;
                } else {
                    for finding in &findings {
                        writeln!(out, "[warning] {}: {}", finding.message(), finding.detail())?;
                    }
                }
                Ok(())
            }
            Command::Backups => {
                let store = SnapshotStore::new(backup_dir);
                let backups = store.list()?;
                if backups.is_empty() {
                    writeln!(out, "No backups in {}", store.backup_dir().display())?;
                }
                for backup in backups {
                    writeln!(
                        out,
                        "{}  {:>10}  {}",
                        backup.modified.format("%Y-%m-%d %H:%M:%S"),
                        backup.size,
                        backup.path.display()
                    )?;
                }
                Ok(())
            }
            Command::Restore { backup } => {
                let snapshot = Snapshot::load(backup)?;
                let mut db = Database::open(&db_path)?;
                info!("Restoring {} from {}", db_path.display(), backup.display());

                let report = SnapshotStore::restore(db.conn_mut(), &snapshot);
                Self::print_restore(out, &report)?;
                report.into_result().map(|_| ())
            }
            Command::Activity { limit } => {
                let db = Database::open(&db_path)?;
                for entry in ActivityLog::recent(db.conn(), *limit)? {
                    writeln!(
                        out,
                        "{:>6}  {}  admin {}  {}  {}",
                        entry.id,
                        entry.created_at.as_deref().unwrap_or("-"),
                        entry.admin_id,
                        entry.action,
                        entry.details.as_deref().unwrap_or("")
                    )?;
                }
                Ok(())
            }
        }
    }

    fn print_migration(out: &mut dyn Write, result: &MigrationResult) -> io::Result<()> {
        writeln!(
            out,
            "Database update {}",
            if result.is_success() { "completed" } else { "FAILED" }
        )?;

        for message in result.messages() {
            writeln!(out, "[{}] {}", message.kind.as_str(), message.text)?;
            if let Some(detail) = &message.detail {
                for line in detail.lines() {
                    writeln!(out, "    {}", line)?;
                }
            }
        }

        writeln!(out)?;
        writeln!(out, "Total operations: {}", result.messages().len())?;
        writeln!(out, "Statements executed: {} of {}", result.executed(), result.total())?;
        writeln!(out, "Success rate: {}%", result.success_rate())?;
        writeln!(out, "Execution time: {}", Utils::format_millis(result.elapsed()))?;
        if let Some(path) = result.backup_path() {
            writeln!(out, "Backup: {}", path.display())?;
        }

        if let Some(report) = result.restore() {
            writeln!(out)?;
            Self::print_restore(out, report)?;
        }
        Ok(())
    }

    fn print_restore(out: &mut dyn Write, report: &RestoreReport) -> io::Result<()> {
        for table in &report.tables {
            match &table.outcome {
                RestoreOutcome::Restored { rows } => {
                    writeln!(out, "restored  {} ({} rows)", table.table, rows)?
                }
                RestoreOutcome::Failed { message } => {
                    writeln!(out, "FAILED    {}: {}", table.table, message)?
                }
                RestoreOutcome::Skipped => writeln!(out, "skipped   {}", table.table)?,
            }
        }
        if report.is_complete() {
            writeln!(out, "All {} tables restored", report.tables.len())?;
        }
        Ok(())
    }
}
