use rusqlite::{Connection, OptionalExtension};

use crate::error::WashDeskError;

pub const ROLE_ADMIN: &str = "admin";
pub const STATUS_ACTIVE: i64 = 1;

pub struct Employees;

impl Employees {
    /// An employee is an administrator when it has the admin role, is active
    /// and has not been soft-deleted.
    pub fn is_admin(conn: &Connection, employee_id: i64) -> Result<bool, WashDeskError> {
        let row: Option<(String, i64, Option<String>)> = conn
            .query_row(
                "SELECT role, status, deleted_at FROM employees WHERE id = ?",
                [employee_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(matches!(
            row,
            Some((role, status, None)) if role == ROLE_ADMIN && status == STATUS_ACTIVE
        ))
    }

    /// Gate for administrative operations.
    pub fn require_admin(conn: &Connection, employee_id: i64) -> Result<(), WashDeskError> {
        if Self::is_admin(conn, employee_id)? {
            Ok(())
        } else {
            Err(WashDeskError::AccessDenied(employee_id))
        }
    }

    pub fn active_admin_count(conn: &Connection) -> Result<i64, WashDeskError> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM employees
             WHERE role = ?1 AND status = ?2 AND deleted_at IS NULL",
            rusqlite::params![ROLE_ADMIN, STATUS_ACTIVE],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
