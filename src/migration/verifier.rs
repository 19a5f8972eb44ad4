use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::database::Database;
use crate::error::WashDeskError;
use crate::schema::{RequiredSchema, RequiredTable};
use crate::utils::Utils;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    MissingColumns,
    MissingIndexes,
    TypeMismatch,
}

/// A structural difference between the live schema and the required one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub table: String,
    pub kind: FindingKind,
    pub items: Vec<String>,
}

impl Finding {
    pub fn message(&self) -> String {
        let what = match self.kind {
            FindingKind::MissingColumns => "Missing columns",
            FindingKind::MissingIndexes => "Missing indexes",
            FindingKind::TypeMismatch => "Column type mismatch",
        };
        format!("{} in {}", what, self.table)
    }

    pub fn detail(&self) -> String {
        self.items.join(", ")
    }
}

pub struct SchemaVerifier;

impl SchemaVerifier {
    /// Compare the live schema with `required`. Read-only.
    ///
    /// A missing table is a `SchemaError`. Everything else is returned as
    /// findings, in the order the tables are listed in `required`.
    pub fn verify(conn: &Connection, required: &RequiredSchema) -> Result<Vec<Finding>, WashDeskError> {
        let mut findings = Vec::new();

        for table in required.tables {
            if !Database::table_exists(conn, table.name)? {
                return Err(WashDeskError::SchemaError(format!(
                    "required table '{}' does not exist",
                    table.name
                )));
            }
            Self::verify_table(conn, table, &mut findings)?;
        }

        for finding in &findings {
            warn!("{}: {}", finding.message(), finding.detail());
        }
        debug!("Schema verified with {} findings", findings.len());

        Ok(findings)
    }

    fn verify_table(
        conn: &Connection,
        table: &RequiredTable,
        findings: &mut Vec<Finding>,
    ) -> Result<(), WashDeskError> {
        let columns = Self::column_types(conn, table.name)?;

        let missing: Vec<String> = table
            .columns
            .iter()
            .filter(|c| !columns.contains_key(c.name))
            .map(|c| c.name.to_owned())
            .collect();

        let mismatched: Vec<String> = table
            .columns
            .iter()
            .filter_map(|c| {
                let expected = c.data_type?;
                let actual = columns.get(c.name)?;
                (!actual.eq_ignore_ascii_case(expected))
                    .then(|| format!("{} ({} expected, found {})", c.name, expected, Self::display_type(actual)))
            })
            .collect();

        let indexes = Self::index_names(conn, table.name)?;
        let missing_indexes: Vec<String> = table
            .indexes
            .iter()
            .filter(|i| !indexes.contains(**i))
            .map(|i| i.to_string())
            .collect();

        for (kind, items) in [
            (FindingKind::MissingColumns, missing),
            (FindingKind::TypeMismatch, mismatched),
            (FindingKind::MissingIndexes, missing_indexes),
        ] {
            if !items.is_empty() {
                findings.push(Finding {
                    table: table.name.to_owned(),
                    kind,
                    items,
                });
            }
        }

        Ok(())
    }

    fn display_type(declared: &str) -> &str {
        if declared.is_empty() {
            "no type"
        } else {
            declared
        }
    }

    /// Column name to declared type.
    fn column_types(conn: &Connection, table: &str) -> Result<HashMap<String, String>, WashDeskError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", Utils::quote_identifier(table)))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?;

        rows.collect::<Result<HashMap<_, _>, _>>()
            .map_err(WashDeskError::DatabaseError)
    }

    fn index_names(conn: &Connection, table: &str) -> Result<HashSet<String>, WashDeskError> {
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", Utils::quote_identifier(table)))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;

        rows.collect::<Result<HashSet<_>, _>>()
            .map_err(WashDeskError::DatabaseError)
    }
}
