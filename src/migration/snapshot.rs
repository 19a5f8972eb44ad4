use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn, Level};
use logging_timer::timer;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::database::Database;
use crate::error::WashDeskError;
use crate::utils::Utils;

const BACKUP_PREFIX: &str = "backup_";
const BACKUP_EXTENSION: &str = "json";

const BLOB_KEY: &str = "blob";
const RAW_TEXT_KEY: &str = "text_hex";

/// Upper bound on rows per INSERT statement during restore.
const INSERT_CHUNK_ROWS: usize = 500;

// ============================================================================
// Values and rows
// ============================================================================

/// A single stored value. Mirrors SQLite's storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// TEXT whose bytes are not valid UTF-8.
    RawText(Vec<u8>),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => match std::str::from_utf8(t) {
                Ok(text) => SqlValue::Text(text.to_owned()),
                Err(_) => SqlValue::RawText(t.to_vec()),
            },
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

impl SqlValue {
    /// Render as an SQL literal. NULL is the bare `NULL` keyword, never `''`.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_owned(),
            // The minimum can't be written as a negated literal: the positive
            // part overflows and SQLite would read it as a real.
            SqlValue::Integer(i64::MIN) => format!("({} - 1)", i64::MIN + 1),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) if f.is_nan() => "NULL".to_owned(),
            SqlValue::Real(f) if f.is_infinite() => {
                if *f > 0.0 { "9e999".to_owned() } else { "-9e999".to_owned() }
            }
            // Debug keeps the fractional part ("3.0") so the value stays a real
            SqlValue::Real(f) => format!("{:?}", f),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::RawText(b) => format!("CAST(X'{}' AS TEXT)", hex::encode(b)),
            SqlValue::Blob(b) => format!("X'{}'", hex::encode(b)),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Integer(i) => serializer.serialize_i64(*i),
            SqlValue::Real(f) => serializer.serialize_f64(*f),
            SqlValue::Text(s) => serializer.serialize_str(s),
            SqlValue::RawText(b) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(RAW_TEXT_KEY, &hex::encode(b))?;
                map.end()
            }
            SqlValue::Blob(b) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(BLOB_KEY, &hex::encode(b))?;
                map.end()
            }
        }
    }
}

struct SqlValueVisitor;

impl<'de> Visitor<'de> for SqlValueVisitor {
    type Value = SqlValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("null, a number, a string, {\"blob\": <hex>} or {\"text_hex\": <hex>}")
    }

    fn visit_unit<E: de::Error>(self) -> Result<SqlValue, E> {
        Ok(SqlValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<SqlValue, E> {
        Ok(SqlValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<SqlValue, D::Error> {
        SqlValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<SqlValue, E> {
        Ok(SqlValue::Integer(v as i64))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<SqlValue, E> {
        Ok(SqlValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<SqlValue, E> {
        Ok(i64::try_from(v)
            .map(SqlValue::Integer)
            .unwrap_or(SqlValue::Real(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<SqlValue, E> {
        Ok(SqlValue::Real(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<SqlValue, E> {
        Ok(SqlValue::Text(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<SqlValue, E> {
        Ok(SqlValue::Text(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<SqlValue, A::Error> {
        let Some((key, encoded)) = map.next_entry::<String, String>()? else {
            return Err(de::Error::missing_field(BLOB_KEY));
        };
        let bytes = hex::decode(&encoded)
            .map_err(|e| de::Error::custom(format!("invalid hex in '{}': {}", key, e)))?;

        match key.as_str() {
            BLOB_KEY => Ok(SqlValue::Blob(bytes)),
            RAW_TEXT_KEY => Ok(SqlValue::RawText(bytes)),
            _ => Err(de::Error::unknown_field(&key, &[BLOB_KEY, RAW_TEXT_KEY])),
        }
    }
}

impl<'de> Deserialize<'de> for SqlValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SqlValueVisitor)
    }
}

/// One table row as ordered (column, value) pairs.
///
/// Table shapes are only known at runtime, so rows are not typed structs.
/// Serialized as a JSON object in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(Vec<(String, SqlValue)>);

impl Row {
    pub fn new(entries: Vec<(String, SqlValue)>) -> Self {
        Row(entries)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(column, _)| column.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.0.iter().map(|(_, value)| value)
    }

    #[cfg(test)]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, value) in &self.0 {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct RowVisitor;

impl<'de> Visitor<'de> for RowVisitor {
    type Value = Row;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a row object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Row, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((column, value)) = map.next_entry::<String, SqlValue>()? {
            entries.push((column, value));
        }
        Ok(Row::new(entries))
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RowVisitor)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Structure and contents of one table.
///
/// `create` holds the `CREATE TABLE` statement followed by the table's
/// explicit `CREATE INDEX` statements. Triggers are kept apart so that they
/// can be recreated after the rows are back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub create: String,
    pub data: Vec<Row>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
    /// `sqlite_sequence` counter of an AUTOINCREMENT table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
}

/// A copy of every user table, keyed by table name. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    tables: BTreeMap<String, TableSnapshot>,
}

impl Snapshot {
    /// Read the structure and rows of every user table.
    pub fn read(conn: &Connection) -> Result<Self, WashDeskError> {
        let mut tables = BTreeMap::new();

        for name in Database::table_names(conn)? {
            let table = Self::read_table(conn, &name)?;
            debug!("Captured table '{}' ({} rows)", name, table.data.len());
            tables.insert(name, table);
        }

        Ok(Snapshot { tables })
    }

    fn read_table(conn: &Connection, name: &str) -> Result<TableSnapshot, WashDeskError> {
        let table_sql: String = conn.query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )?;

        let mut create = format!("{};\n", table_sql);
        // Automatic indexes (UNIQUE, PRIMARY KEY) have no SQL and come back with the table
        for index_sql in Self::schema_sql(conn, "index", name)? {
            create.push_str(&index_sql);
            create.push_str(";\n");
        }

        let triggers = Self::schema_sql(conn, "trigger", name)?;

        let columns = Self::stored_columns(conn, name)?;
        let column_list: Vec<String> = columns.iter().map(|c| Utils::quote_identifier(c)).collect();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {}",
            column_list.join(", "),
            Utils::quote_identifier(name)
        ))?;

        let mut data = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut entries = Vec::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                entries.push((column.clone(), SqlValue::from(row.get_ref(i)?)));
            }
            data.push(Row::new(entries));
        }

        let sequence = Self::sequence(conn, name)?;

        Ok(TableSnapshot {
            create,
            data,
            triggers,
            sequence,
        })
    }

    /// Columns that hold data. Generated columns (`hidden` 2 and 3 in
    /// `table_xinfo`) are recomputed by SQLite and can't be inserted.
    fn stored_columns(conn: &Connection, table: &str) -> Result<Vec<String>, WashDeskError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_xinfo({})", Utils::quote_identifier(table)))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>("name")?, row.get::<_, i64>("hidden")?)))?;

        let mut columns = Vec::new();
        for row in rows {
            let (name, hidden) = row?;
            if hidden != 2 && hidden != 3 {
                columns.push(name);
            }
        }
        Ok(columns)
    }

    fn sequence(conn: &Connection, table: &str) -> Result<Option<i64>, WashDeskError> {
        // sqlite_sequence only exists once an AUTOINCREMENT table has been created
        if !Database::table_exists(conn, "sqlite_sequence")? {
            return Ok(None);
        }

        let seq = conn
            .query_row("SELECT seq FROM sqlite_sequence WHERE name = ?", [table], |row| row.get(0))
            .optional()?;
        Ok(seq)
    }

    fn schema_sql(conn: &Connection, kind: &str, table: &str) -> Result<Vec<String>, WashDeskError> {
        let mut stmt = conn.prepare(
            "SELECT sql FROM sqlite_master
             WHERE type = ? AND tbl_name = ? AND sql IS NOT NULL
             ORDER BY name",
        )?;
        let rows = stmt.query_map([kind, table], |row| row.get(0))?;

        rows.collect::<Result<Vec<String>, _>>()
            .map_err(WashDeskError::DatabaseError)
    }

    pub fn load(path: &Path) -> Result<Self, WashDeskError> {
        let file = File::open(path)?;
        let snapshot = serde_json::from_reader(BufReader::new(file))?;
        Ok(snapshot)
    }

    fn write(&self, file: File) -> Result<(), WashDeskError> {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn tables(&self) -> &BTreeMap<String, TableSnapshot> {
        &self.tables
    }

    #[cfg(test)]
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(|t| t.data.len()).sum()
    }
}

/// A snapshot together with the file it was written to.
#[derive(Debug)]
pub struct Backup {
    pub path: PathBuf,
    pub snapshot: Snapshot,
}

/// A backup artifact found on disk.
#[derive(Debug, Clone, Serialize)]
pub struct BackupFile {
    pub path: PathBuf,
    pub modified: DateTime<Local>,
    pub size: u64,
}

// ============================================================================
// Restore report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RestoreOutcome {
    Restored { rows: usize },
    Failed { message: String },
    /// Not attempted because an earlier table failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRestore {
    pub table: String,
    pub outcome: RestoreOutcome,
}

/// Per-table outcome of a restore, in restore order.
///
/// Restore is best effort: the first failing table ends it, and every table
/// after it is reported as skipped.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RestoreReport {
    pub tables: Vec<TableRestore>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.tables
            .iter()
            .all(|t| matches!(t.outcome, RestoreOutcome::Restored { .. }))
    }

    pub fn restored_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, RestoreOutcome::Restored { .. }))
            .count()
    }

    pub fn first_error(&self) -> Option<WashDeskError> {
        self.tables.iter().find_map(|t| match &t.outcome {
            RestoreOutcome::Failed { message } => Some(WashDeskError::RestoreError {
                table: t.table.clone(),
                message: message.clone(),
            }),
            _ => None,
        })
    }

    /// `Ok` with the number of restored rows when every table was restored.
    pub fn into_result(self) -> Result<usize, WashDeskError> {
        if let Some(err) = self.first_error() {
            return Err(err);
        }
        Ok(self
            .tables
            .iter()
            .map(|t| match t.outcome {
                RestoreOutcome::Restored { rows } => rows,
                _ => 0,
            })
            .sum())
    }
}

// ============================================================================
// SnapshotStore
// ============================================================================

/// Captures snapshots into a backup directory and replays them.
pub struct SnapshotStore {
    backup_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        SnapshotStore {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot every table and write it to a new timestamped file.
    ///
    /// Any failure is a `StorageError`: the caller must not go on to mutate
    /// the database.
    pub fn capture(&self, conn: &Connection) -> Result<Backup, WashDeskError> {
        let _tmr = timer!(Level::Debug; "SnapshotStore::capture");

        let snapshot = Snapshot::read(conn)
            .map_err(|e| WashDeskError::StorageError(format!("could not read tables: {}", e)))?;

        let (path, file) = self.create_backup_file().map_err(|e| {
            WashDeskError::StorageError(format!(
                "could not create backup file in {}: {}",
                self.backup_dir.display(),
                e
            ))
        })?;

        snapshot.write(file).map_err(|e| {
            WashDeskError::StorageError(format!("could not write {}: {}", path.display(), e))
        })?;

        info!(
            "Backup written to {} ({} tables, {} rows)",
            path.display(),
            snapshot.len(),
            snapshot.row_count()
        );

        Ok(Backup { path, snapshot })
    }

    /// Create `backup_<timestamp>.json`, adding a numeric suffix if a backup
    /// with the same timestamp already exists.
    fn create_backup_file(&self) -> io::Result<(PathBuf, File)> {
        fs::create_dir_all(&self.backup_dir)?;

        let stamp = Local::now().format("%Y-%m-%d_%H%M%S").to_string();
        let mut attempt = 0;
        loop {
            let name = if attempt == 0 {
                format!("{}{}.{}", BACKUP_PREFIX, stamp, BACKUP_EXTENSION)
            } else {
                format!("{}{}_{}.{}", BACKUP_PREFIX, stamp, attempt, BACKUP_EXTENSION)
            };
            let path = self.backup_dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Backup artifacts in the backup directory, newest first.
    pub fn list(&self) -> Result<Vec<BackupFile>, WashDeskError> {
        let dir = match fs::read_dir(&self.backup_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in dir {
            let entry = entry?;
            let path = entry.path();

            let is_backup = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(BACKUP_PREFIX))
                .unwrap_or(false)
                && path.extension().and_then(|e| e.to_str()) == Some(BACKUP_EXTENSION);
            if !is_backup {
                continue;
            }

            let metadata = entry.metadata()?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            backups.push(BackupFile {
                path,
                modified: DateTime::<Local>::from(modified),
                size: metadata.len(),
            });
        }

        // Newest first; names carry the timestamp so they break ties
        backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
        Ok(backups)
    }

    /// Replace every table in `snapshot` with its captured structure and rows.
    ///
    /// Must not be called inside an open transaction. Each table is restored
    /// in its own transaction, so a table is either fully replaced or left
    /// untouched. Foreign key enforcement is switched off while tables are
    /// dropped and refilled, and switched back on afterwards if it was on.
    pub fn restore(conn: &mut Connection, snapshot: &Snapshot) -> RestoreReport {
        let _tmr = timer!(Level::Debug; "SnapshotStore::restore");

        let foreign_keys = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get::<_, bool>(0))
            .unwrap_or(false);
        if foreign_keys {
            if let Err(e) = conn.execute_batch("PRAGMA foreign_keys = OFF;") {
                warn!("Could not disable foreign keys for restore: {}", e);
            }
        }

        let mut report = RestoreReport::default();
        let mut failed = false;

        for (name, table) in snapshot.tables() {
            let outcome = if failed {
                RestoreOutcome::Skipped
            } else {
                match Self::restore_table(conn, name, table) {
                    Ok(rows) => {
                        debug!("Restored table '{}' ({} rows)", name, rows);
                        RestoreOutcome::Restored { rows }
                    }
                    Err(e) => {
                        error!("Failed to restore table '{}': {}", name, e);
                        failed = true;
                        RestoreOutcome::Failed {
                            message: e.to_string(),
                        }
                    }
                }
            };

            report.tables.push(TableRestore {
                table: name.clone(),
                outcome,
            });
        }

        if foreign_keys {
            if let Err(e) = conn.execute_batch("PRAGMA foreign_keys = ON;") {
                warn!("Could not re-enable foreign keys after restore: {}", e);
            }
        }

        info!(
            "Restore finished: {} of {} tables restored",
            report.restored_count(),
            report.tables.len()
        );
        report
    }

    fn restore_table(
        conn: &mut Connection,
        name: &str,
        table: &TableSnapshot,
    ) -> Result<usize, WashDeskError> {
        let quoted = Utils::quote_identifier(name);
        let tx = conn.transaction()?;

        tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", quoted))?;
        tx.execute_batch(&table.create)?;

        for chunk in table.data.chunks(INSERT_CHUNK_ROWS) {
            tx.execute_batch(&Self::insert_sql(&quoted, chunk)?)?;
        }

        // Reinserting resets the counter to max(rowid); put the captured one back
        if let Some(seq) = table.sequence {
            tx.execute("DELETE FROM sqlite_sequence WHERE name = ?", [name])?;
            tx.execute(
                "INSERT INTO sqlite_sequence (name, seq) VALUES (?, ?)",
                params![name, seq],
            )?;
        }

        for trigger in &table.triggers {
            tx.execute_batch(trigger)?;
        }

        tx.commit()?;
        Ok(table.data.len())
    }

    /// Build one multi-row INSERT. The column list comes from the first row
    /// and every other row must have the same columns.
    fn insert_sql(quoted_table: &str, rows: &[Row]) -> Result<String, WashDeskError> {
        let Some(first) = rows.first() else {
            return Err(WashDeskError::Error("no rows to insert".to_owned()));
        };
        let columns: Vec<&str> = first.columns().collect();

        let mut values = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if !row.columns().eq(columns.iter().copied()) {
                return Err(WashDeskError::Error(format!(
                    "row {} does not match the columns of the first row",
                    i
                )));
            }
            let literals: Vec<String> = row.values().map(SqlValue::to_sql_literal).collect();
            values.push(format!("({})", literals.join(",")));
        }

        let column_list: Vec<String> = columns.iter().map(|c| Utils::quote_identifier(c)).collect();
        Ok(format!(
            "INSERT INTO {} ({}) VALUES {};",
            quoted_table,
            column_list.join(","),
            values.join(",")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const FIXTURE_SQL: &str = r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE employees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            rate REAL,
            photo BLOB,
            deleted_at TEXT
        );
        CREATE INDEX idx_name ON employees (name);
        CREATE TABLE audit (
            id INTEGER PRIMARY KEY,
            employee_id INTEGER NOT NULL REFERENCES employees(id),
            note TEXT
        );
        CREATE TRIGGER employees_audit AFTER UPDATE ON employees
        BEGIN
            INSERT INTO audit (employee_id, note) VALUES (NEW.id, 'updated; again');
        END;
        INSERT INTO employees (name, email, rate, photo, deleted_at) VALUES
            ('Budi', 'budi@example.com', 12.5, X'00ff10', NULL),
            ('O''Neil', 'oneil@example.com', NULL, NULL, '2024-02-01 10:00:00'),
            ('Sari', 'sari@example.com', 3.0, NULL, NULL);
        INSERT INTO audit (employee_id, note) VALUES (1, NULL), (2, 'hired');
    "#;

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(FIXTURE_SQL).unwrap();
        conn
    }

    #[test]
    fn test_read_captures_structure_and_rows() {
        let conn = fixture();
        let snapshot = Snapshot::read(&conn).unwrap();

        let names: Vec<&String> = snapshot.tables().keys().collect();
        assert_eq!(names, vec!["audit", "employees"]);

        let employees = snapshot.table("employees").unwrap();
        assert!(employees.create.starts_with("CREATE TABLE employees"));
        assert!(employees.create.contains("CREATE INDEX idx_name ON employees (name);\n"));
        assert_eq!(employees.triggers.len(), 1);
        assert_eq!(employees.data.len(), 3);

        let oneil = &employees.data[1];
        assert_eq!(
            oneil.columns().collect::<Vec<_>>(),
            vec!["id", "name", "email", "rate", "photo", "deleted_at"]
        );
        assert_eq!(oneil.get("name"), Some(&SqlValue::Text("O'Neil".into())));
        assert_eq!(oneil.get("rate"), Some(&SqlValue::Null));
        assert_eq!(
            employees.data[0].get("photo"),
            Some(&SqlValue::Blob(vec![0x00, 0xff, 0x10]))
        );
    }

    #[test]
    fn test_sql_literals() {
        assert_eq!(SqlValue::Null.to_sql_literal(), "NULL");
        assert_eq!(SqlValue::Integer(-7).to_sql_literal(), "-7");
        assert_eq!(SqlValue::Real(3.0).to_sql_literal(), "3.0");
        assert_eq!(SqlValue::Text("it's".into()).to_sql_literal(), "'it''s'");
        assert_eq!(SqlValue::Text(String::new()).to_sql_literal(), "''");
        assert_eq!(SqlValue::Blob(vec![0xde, 0xad]).to_sql_literal(), "X'dead'");
        assert_eq!(
            SqlValue::Integer(i64::MIN).to_sql_literal(),
            "(-9223372036854775807 - 1)"
        );
    }

    #[test]
    fn test_extreme_integers_survive_literal_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        for value in [i64::MIN, i64::MAX, 0] {
            let sql = format!("SELECT {}", SqlValue::Integer(value).to_sql_literal());
            let back: i64 = conn.query_row(&sql, [], |row| row.get(0)).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_json_layout() {
        let conn = fixture();
        let snapshot = Snapshot::read(&conn).unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();

        assert!(json["employees"]["create"].is_string());
        assert_eq!(json["employees"]["data"][0]["name"], "Budi");
        assert_eq!(json["employees"]["data"][0]["rate"], 12.5);
        assert_eq!(json["employees"]["data"][0]["photo"]["blob"], "00ff10");
        assert!(json["employees"]["data"][0]["deleted_at"].is_null());
        assert!(json["audit"].get("triggers").is_none(), "empty trigger list is omitted");
        assert_eq!(json["employees"]["sequence"], 3);
        assert!(json["audit"].get("sequence").is_none());

        // A Value map sorts its keys, so compare through the text form
        let back: Snapshot = serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_row_keeps_column_order_through_json() {
        let row = Row::new(vec![
            ("zeta".into(), SqlValue::Integer(1)),
            ("alpha".into(), SqlValue::Real(2.0)),
        ]);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":2.0}"#);

        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_capture_writes_timestamped_file() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("backups"));
        let conn = fixture();

        let backup = store.capture(&conn).unwrap();
        let file_name = backup.path.file_name().unwrap().to_str().unwrap().to_owned();
        assert!(file_name.starts_with("backup_"));
        assert!(file_name.ends_with(".json"));

        let loaded = Snapshot::load(&backup.path).unwrap();
        assert_eq!(loaded, backup.snapshot);
    }

    #[test]
    fn test_capture_twice_in_same_second_does_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let conn = fixture();

        let first = store.capture(&conn).unwrap();
        let second = store.capture(&conn).unwrap();
        assert_ne!(first.path, second.path);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_capture_fails_with_storage_error_when_dir_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("backups");
        fs::write(&blocker, b"not a directory").unwrap();

        let store = SnapshotStore::new(&blocker);
        let err = store.capture(&fixture()).unwrap_err();
        assert!(matches!(err, WashDeskError::StorageError(_)), "{:?}", err);
    }

    #[test]
    fn test_list_ignores_other_files_and_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());

        let store = SnapshotStore::new(dir.path());
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("backup_2024-01-01_000000.json"), b"{}").unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, 2);
    }

    #[test]
    fn test_round_trip_restore_after_drop() {
        let mut conn = fixture();
        let before = Snapshot::read(&conn).unwrap();

        conn.execute_batch("PRAGMA foreign_keys = OFF; DROP TABLE employees; PRAGMA foreign_keys = ON;")
            .unwrap();
        assert!(!Database::table_exists(&conn, "employees").unwrap());

        let report = SnapshotStore::restore(&mut conn, &before);
        assert!(report.is_complete(), "{:?}", report);
        assert_eq!(report.clone().into_result().unwrap(), 5);

        let after = Snapshot::read(&conn).unwrap();
        assert_eq!(after, before);

        // Foreign key enforcement is back on
        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_restore_replaces_modified_rows_without_firing_triggers() {
        let mut conn = fixture();
        let before = Snapshot::read(&conn).unwrap();

        conn.execute_batch(
            "UPDATE employees SET name = 'Changed' WHERE id = 1;
             DELETE FROM employees WHERE id = 3;",
        )
        .unwrap();

        let report = SnapshotStore::restore(&mut conn, &before);
        assert!(report.is_complete());
        assert_eq!(Snapshot::read(&conn).unwrap(), before);

        // The trigger is back and working
        conn.execute("UPDATE employees SET name = 'Again' WHERE id = 2", []).unwrap();
        let notes: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit WHERE note = 'updated; again'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(notes, 1);
    }

    #[test]
    fn test_restore_inserts_in_chunks() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE big (id INTEGER PRIMARY KEY, label TEXT);").unwrap();
        {
            let tx = conn.transaction().unwrap();
            for i in 0..1203 {
                tx.execute("INSERT INTO big (id, label) VALUES (?, ?)", rusqlite::params![i, format!("row {}", i)])
                    .unwrap();
            }
            tx.commit().unwrap();
        }
        let before = Snapshot::read(&conn).unwrap();
        conn.execute_batch("DELETE FROM big;").unwrap();

        let report = SnapshotStore::restore(&mut conn, &before);
        assert_eq!(
            report.tables,
            vec![TableRestore {
                table: "big".into(),
                outcome: RestoreOutcome::Restored { rows: 1203 }
            }]
        );
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM big", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1203);
    }

    #[test]
    fn test_partial_restore_reports_first_failure_and_skips_rest() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE a (x INTEGER); INSERT INTO a VALUES (1);
             CREATE TABLE b (x INTEGER); INSERT INTO b VALUES (2);
             CREATE TABLE c (x INTEGER); INSERT INTO c VALUES (3);",
        )
        .unwrap();

        let mut json = serde_json::to_value(Snapshot::read(&conn).unwrap()).unwrap();
        json["b"]["create"] = serde_json::Value::from("CREATE TABLE b (x INTEGER;");
        let broken: Snapshot = serde_json::from_str(&json.to_string()).unwrap();

        conn.execute_batch("INSERT INTO a VALUES (10); INSERT INTO b VALUES (20); INSERT INTO c VALUES (30);")
            .unwrap();

        let report = SnapshotStore::restore(&mut conn, &broken);
        assert_eq!(report.tables[0].outcome, RestoreOutcome::Restored { rows: 1 });
        assert!(matches!(report.tables[1].outcome, RestoreOutcome::Failed { .. }));
        assert_eq!(report.tables[2].outcome, RestoreOutcome::Skipped);
        assert!(!report.is_complete());

        match report.first_error() {
            Some(WashDeskError::RestoreError { table, .. }) => assert_eq!(table, "b"),
            other => panic!("unexpected: {:?}", other),
        }

        // b's transaction rolled back, so its rows are as the failure left them
        let b_rows: i64 = conn.query_row("SELECT COUNT(*) FROM b", [], |row| row.get(0)).unwrap();
        assert_eq!(b_rows, 2);
        let c_rows: i64 = conn.query_row("SELECT COUNT(*) FROM c", [], |row| row.get(0)).unwrap();
        assert_eq!(c_rows, 2);
        let a_rows: i64 = conn.query_row("SELECT COUNT(*) FROM a", [], |row| row.get(0)).unwrap();
        assert_eq!(a_rows, 1);
    }

    #[test]
    fn test_restore_keeps_autoincrement_counter() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE tickets (id INTEGER PRIMARY KEY AUTOINCREMENT, plate TEXT);
             INSERT INTO tickets (plate) VALUES ('B 1'), ('B 2'), ('B 3');
             DELETE FROM tickets WHERE id = 3;",
        )
        .unwrap();

        let before = Snapshot::read(&conn).unwrap();
        assert_eq!(before.table("tickets").unwrap().sequence, Some(3));

        let report = SnapshotStore::restore(&mut conn, &before);
        assert!(report.is_complete(), "{:?}", report);

        conn.execute("INSERT INTO tickets (plate) VALUES ('B 4')", []).unwrap();
        assert_eq!(conn.last_insert_rowid(), 4, "deleted ids must not be handed out again");
    }

    #[test]
    fn test_sequence_survives_backup_file() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let conn = fixture();
        conn.execute_batch("DELETE FROM audit; DELETE FROM employees WHERE id = 3;").unwrap();

        let backup = store.capture(&conn).unwrap();
        let loaded = Snapshot::load(&backup.path).unwrap();
        assert_eq!(loaded.table("employees").unwrap().sequence, Some(3));
        assert_eq!(loaded.table("audit").unwrap().sequence, None);
    }

    #[test]
    fn test_generated_columns_are_not_captured_and_are_recomputed() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE g (
                 a INTEGER,
                 b INTEGER GENERATED ALWAYS AS (a * 2) STORED,
                 c INTEGER GENERATED ALWAYS AS (a + 1) VIRTUAL
             );
             CREATE TABLE h (x INTEGER);
             INSERT INTO g (a) VALUES (1), (5);
             INSERT INTO h VALUES (7);",
        )
        .unwrap();

        let before = Snapshot::read(&conn).unwrap();
        let g = before.table("g").unwrap();
        assert_eq!(g.data[0].columns().collect::<Vec<_>>(), vec!["a"]);

        conn.execute_batch("DELETE FROM g; DELETE FROM h;").unwrap();
        let report = SnapshotStore::restore(&mut conn, &before);
        assert!(report.is_complete(), "{:?}", report);

        let (b, c): (i64, i64) = conn
            .query_row("SELECT b, c FROM g WHERE a = 5", [], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        assert_eq!((b, c), (10, 6));
        let h_rows: i64 = conn.query_row("SELECT COUNT(*) FROM h", [], |row| row.get(0)).unwrap();
        assert_eq!(h_rows, 1);
    }

    #[test]
    fn test_non_utf8_text_is_kept_byte_for_byte() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);
             INSERT INTO notes VALUES (1, CAST(X'c328' AS TEXT)), (2, 'plain');",
        )
        .unwrap();

        let backup = store.capture(&conn).unwrap();
        let notes = backup.snapshot.table("notes").unwrap();
        assert_eq!(notes.data[0].get("body"), Some(&SqlValue::RawText(vec![0xc3, 0x28])));
        assert_eq!(notes.data[1].get("body"), Some(&SqlValue::Text("plain".into())));

        let loaded = Snapshot::load(&backup.path).unwrap();
        assert_eq!(loaded, backup.snapshot);

        conn.execute_batch("UPDATE notes SET body = 'lost' WHERE id = 1;").unwrap();
        let report = SnapshotStore::restore(&mut conn, &loaded);
        assert!(report.is_complete(), "{:?}", report);

        let (kind, bytes): (String, String) = conn
            .query_row("SELECT typeof(body), hex(body) FROM notes WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(kind, "text");
        assert_eq!(bytes, "C328");
    }

    #[test]
    fn test_raw_text_json_form() {
        let value = SqlValue::RawText(vec![0xff, 0x00]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"text_hex":"ff00"}"#);
        assert_eq!(serde_json::from_str::<SqlValue>(&json).unwrap(), value);
        assert_eq!(value.to_sql_literal(), "CAST(X'ff00' AS TEXT)");

        assert!(serde_json::from_str::<SqlValue>(r#"{"other":"00"}"#).is_err());
        assert!(serde_json::from_str::<SqlValue>(r#"{"blob":"zz"}"#).is_err());
    }

    #[test]
    fn test_insert_sql_rejects_mismatched_rows() {
        let rows = vec![
            Row::new(vec![("a".into(), SqlValue::Integer(1))]),
            Row::new(vec![("b".into(), SqlValue::Integer(2))]),
        ];
        assert!(SnapshotStore::insert_sql("\"t\"", &rows).is_err());
    }
}
