use std::fs;
use std::path::Path;

use log::{debug, info};
use rusqlite::{Connection, OpenFlags};

use crate::error::WashDeskError;
use crate::schema::CREATE_SCHEMA_SQL;

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and make sure the base tables exist.
    pub fn open(db_path: &Path) -> Result<Self, WashDeskError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        info!("Database opened at: {}", db_path.display());

        let db = Self::from_connection(conn)?;
        Ok(db)
    }

    /// Open an existing database file read-only. Nothing is created.
    pub fn open_existing(db_path: &Path) -> Result<Self, WashDeskError> {
        if !db_path.is_file() {
            return Err(WashDeskError::Error(format!(
                "Database not found at {}",
                db_path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!("Database opened read-only at: {}", db_path.display());

        Ok(Database { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, WashDeskError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, WashDeskError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database { conn };
        db.ensure_schema()?;
        Ok(db)
    }

    fn ensure_schema(&self) -> Result<(), WashDeskError> {
        debug!("Ensuring base schema");
        self.conn.execute_batch(CREATE_SCHEMA_SQL)?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Names of all user tables, sorted. SQLite's internal tables are excluded.
    pub fn table_names(conn: &Connection) -> Result<Vec<String>, WashDeskError> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        rows.collect::<Result<Vec<String>, _>>()
            .map_err(WashDeskError::DatabaseError)
    }

    pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, WashDeskError> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            [table],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}
