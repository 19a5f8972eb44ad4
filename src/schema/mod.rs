mod base;

pub use base::CREATE_SCHEMA_SQL;

/// A column the schema verifier expects to find.
///
/// When `data_type` is set, the column's declared type must match it
/// (case-insensitively). `None` only requires the column to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredColumn {
    pub name: &'static str,
    pub data_type: Option<&'static str>,
}

impl RequiredColumn {
    pub const fn named(name: &'static str) -> Self {
        Self {
            name,
            data_type: None,
        }
    }

    pub const fn typed(name: &'static str, data_type: &'static str) -> Self {
        Self {
            name,
            data_type: Some(data_type),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredTable {
    pub name: &'static str,
    pub columns: &'static [RequiredColumn],
    pub indexes: &'static [&'static str],
}

/// The structure a migrated database must have. Read-only reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredSchema {
    pub tables: &'static [RequiredTable],
}

pub const EMPLOYEE_SCHEMA: RequiredSchema = RequiredSchema {
    tables: &[
        RequiredTable {
            name: "employees",
            columns: &[
                RequiredColumn::typed("id", "INTEGER"),
                RequiredColumn::typed("name", "TEXT"),
                RequiredColumn::typed("email", "TEXT"),
                RequiredColumn::typed("password", "TEXT"),
                RequiredColumn::typed("status", "INTEGER"),
                RequiredColumn::typed("role", "TEXT"),
                RequiredColumn::named("deleted_at"),
                RequiredColumn::named("created_at"),
            ],
            indexes: &["idx_email", "idx_status", "idx_role", "idx_deleted_at"],
        },
        RequiredTable {
            name: "activity_log",
            columns: &[
                RequiredColumn::typed("id", "INTEGER"),
                RequiredColumn::typed("admin_id", "INTEGER"),
                RequiredColumn::typed("action", "TEXT"),
                RequiredColumn::named("details"),
                RequiredColumn::named("created_at"),
            ],
            indexes: &["idx_admin_action", "idx_created_at"],
        },
        RequiredTable {
            name: "transactions",
            columns: &[
                RequiredColumn::typed("id", "INTEGER"),
                RequiredColumn::typed("employee_id", "INTEGER"),
                RequiredColumn::named("amount"),
                RequiredColumn::named("status"),
                RequiredColumn::named("transaction_date"),
            ],
            indexes: &["idx_employee_date", "idx_status_date"],
        },
    ],
};
