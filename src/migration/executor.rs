use std::fmt;

use log::{debug, info, warn};
use rusqlite::Connection;

use crate::error::WashDeskError;
use crate::utils::Utils;

use super::result::MigrationResult;

const EXCERPT_CHARS: usize = 100;

/// SQLSTATE-style classification of a failed statement.
///
/// SQLite reports these conditions as a generic `SQLITE_ERROR`, so the code
/// is derived from the error message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// 42S21: the column being added is already there.
    DuplicateColumn,
    /// 42S01: the table, index, trigger or view being created is already there.
    ObjectExists,
    Other,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DuplicateColumn => "42S21",
            ErrorCode::ObjectExists => "42S01",
            ErrorCode::Other => "HY000",
        }
    }

    pub fn classify(err: &rusqlite::Error) -> Self {
        let Some(message) = sqlite_message(err) else {
            return ErrorCode::Other;
        };

        if message.starts_with("duplicate column name") {
            ErrorCode::DuplicateColumn
        } else if message.ends_with("already exists") {
            ErrorCode::ObjectExists
        } else {
            ErrorCode::Other
        }
    }

    /// Tolerable codes mean the change was applied by an earlier run.
    pub fn is_tolerable(&self) -> bool {
        !matches!(self, ErrorCode::Other)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQLite's own message. Errors SQLite can point at in the statement text
/// (e.g. "table t already exists") arrive as `SqlInputError`.
fn sqlite_message(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => Some(message.as_str()),
        rusqlite::Error::SqlInputError { msg, .. } => Some(msg.as_str()),
        _ => None,
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub executed: usize,
    pub total: usize,
}

pub struct Executor;

impl Executor {
    /// Execute `statements` in order against `conn`, which is expected to be
    /// inside the migration's transaction.
    ///
    /// Blank statements are skipped. Statements failing with a tolerable code
    /// are recorded as notices and not counted as executed. Any other failure
    /// stops the run and is returned as `ExecutionError`.
    pub fn run<I>(
        conn: &Connection,
        statements: I,
        result: &mut MigrationResult,
    ) -> Result<ExecutionSummary, WashDeskError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut summary = ExecutionSummary::default();

        for statement in statements {
            summary.total += 1;
            if statement.trim().is_empty() {
                continue;
            }

            let excerpt = Utils::excerpt(&statement, EXCERPT_CHARS);
            debug!("Executing: {}", excerpt);

            match conn.execute_batch(&statement) {
                Ok(()) => {
                    summary.executed += 1;
                    result.success("Query executed successfully", Some(excerpt));
                }
                Err(err) => {
                    let code = ErrorCode::classify(&err);
                    if !code.is_tolerable() {
                        warn!("Statement failed [{}] {}: {}", code, err, excerpt);
                        return Err(WashDeskError::ExecutionError {
                            code,
                            statement: excerpt,
                            source: err,
                        });
                    }

                    info!("Tolerated [{}] {}: {}", code, err, excerpt);
                    let notice = match code {
                        ErrorCode::DuplicateColumn => "Column already exists".to_owned(),
                        _ => Self::exists_notice(&err),
                    };
                    result.notice(notice, Some(excerpt));
                }
            }
        }

        Ok(summary)
    }

    /// "table x already exists" -> "Table already exists"
    fn exists_notice(err: &rusqlite::Error) -> String {
        let object = sqlite_message(err)
            .and_then(|message| message.split_whitespace().next())
            .unwrap_or("object");

        let mut chars = object.chars();
        match chars.next() {
            Some(first) => format!("{}{} already exists", first.to_uppercase(), chars.as_str()),
            None => "Object already exists".to_owned(),
        }
    }
}
