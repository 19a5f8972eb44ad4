pub const CREATE_SCHEMA_SQL: &str = r#"
BEGIN TRANSACTION;

-- Employee roster. status: 1 = active, 0 = inactive. deleted_at marks a soft delete.
CREATE TABLE IF NOT EXISTS employees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'employee',  -- 'admin' or 'employee'
    status INTEGER NOT NULL DEFAULT 1,
    phone TEXT,
    address TEXT,
    join_date TEXT,
    last_login_at TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
    deleted_at TEXT
);

-- Append-only audit trail of administrative actions
CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    admin_id INTEGER NOT NULL,
    action TEXT NOT NULL,
    details TEXT,
    entity_type TEXT,
    entity_id INTEGER,
    old_values TEXT,       -- JSON
    new_values TEXT,       -- JSON
    ip_address TEXT,
    user_agent TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (admin_id) REFERENCES employees(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    employee_id INTEGER NOT NULL,
    vehicle_type TEXT NOT NULL,
    license_plate TEXT NOT NULL,
    wash_type_id INTEGER NOT NULL,
    payment_method_id INTEGER NOT NULL,
    amount REAL NOT NULL,
    final_amount REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    transaction_date TEXT DEFAULT CURRENT_TIMESTAMP,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (employee_id) REFERENCES employees(id)
);

COMMIT;
"#;
