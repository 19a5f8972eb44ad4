use rusqlite::{named_params, Connection};
use serde::Serialize;

use crate::error::WashDeskError;

/// An entry to append to `activity_log`.
///
/// `old_values` and `new_values` are stored as JSON text.
#[derive(Debug, Clone, Default)]
pub struct ActivityEntry {
    pub admin_id: i64,
    pub action: String,
    pub details: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
}

impl ActivityEntry {
    pub fn new(admin_id: i64, action: &str, details: &str) -> Self {
        Self {
            admin_id,
            action: action.to_owned(),
            details: details.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity_type: &str, entity_id: i64) -> Self {
        self.entity_type = Some(entity_type.to_owned());
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_values(
        mut self,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
    ) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }
}

/// A row read back from `activity_log`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub admin_id: i64,
    pub action: String,
    pub details: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub created_at: Option<String>,
}

/// Append-only audit trail of administrative actions.
pub struct ActivityLog;

impl ActivityLog {
    pub fn log(
        conn: &Connection,
        admin_id: i64,
        action: &str,
        details: &str,
    ) -> Result<(), WashDeskError> {
        Self::record(conn, &ActivityEntry::new(admin_id, action, details))
    }

    pub fn record(conn: &Connection, entry: &ActivityEntry) -> Result<(), WashDeskError> {
        let old_values = entry.old_values.as_ref().map(|v| v.to_string());
        let new_values = entry.new_values.as_ref().map(|v| v.to_string());

        conn.execute(
            "INSERT INTO activity_log (
                admin_id,
                action,
                details,
                entity_type,
                entity_id,
                old_values,
                new_values
             )
             VALUES (
                :admin_id,
                :action,
                :details,
                :entity_type,
                :entity_id,
                :old_values,
                :new_values
             )",
            named_params! {
                ":admin_id":    entry.admin_id,
                ":action":      entry.action,
                ":details":     entry.details,
                ":entity_type": entry.entity_type,
                ":entity_id":   entry.entity_id,
                ":old_values":  old_values,
                ":new_values":  new_values,
            },
        )
        .map_err(|e| WashDeskError::LogError(format!("'{}': {}", entry.action, e)))?;

        Ok(())
    }

    /// Most recent entries first.
    pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<ActivityRecord>, WashDeskError> {
        let mut stmt = conn.prepare(
            "SELECT id, admin_id, action, details, entity_type, entity_id, created_at
             FROM activity_log
             ORDER BY id DESC
             LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            Ok(ActivityRecord {
                id: row.get(0)?,
                admin_id: row.get(1)?,
                action: row.get(2)?,
                details: row.get(3)?,
                entity_type: row.get(4)?,
                entity_id: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(WashDeskError::DatabaseError)
    }
}
