use log::{info, warn};
use rusqlite::{Connection, OptionalExtension};

use crate::employees::{Employees, ROLE_ADMIN, STATUS_ACTIVE};
use crate::error::WashDeskError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCheck {
    /// At least one active administrator exists. Nothing was changed.
    Present(i64),
    /// No administrator existed; this employee was promoted.
    Promoted { employee_id: i64, previous_role: String },
    /// No administrator and no active employee to promote.
    NoCandidate,
}

pub struct AdminEnforcer;

impl AdminEnforcer {
    /// Make sure at least one active, non-deleted administrator exists,
    /// promoting the lowest-id active employee when none does.
    pub fn ensure_admin_exists(conn: &Connection) -> Result<AdminCheck, WashDeskError> {
        let count = Employees::active_admin_count(conn)?;
        if count > 0 {
            return Ok(AdminCheck::Present(count));
        }

        let candidate: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, role FROM employees
                 WHERE status = ? AND deleted_at IS NULL
                 ORDER BY id
                 LIMIT 1",
                [STATUS_ACTIVE],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((employee_id, previous_role)) = candidate else {
            warn!("No active administrator and no active employee to promote");
            return Ok(AdminCheck::NoCandidate);
        };

        conn.execute(
            "UPDATE employees SET role = ? WHERE id = ?",
            rusqlite::params![ROLE_ADMIN, employee_id],
        )?;
        info!("Promoted employee {} to administrator", employee_id);

        Ok(AdminCheck::Promoted {
            employee_id,
            previous_role,
        })
    }
}
