use rusqlite::{Connection, Result};

/// Initialise all tables the scheduling engine reads and writes. Safe to call
/// on every startup; CREATE IF NOT EXISTS keeps it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_directory_tables(conn)?;
    create_policies_table(conn)?;
    create_tasks_table(conn)?;
    create_budget_tables(conn)?;
    create_expenses_table(conn)?;
    create_alerts_table(conn)?;
    Ok(())
}

fn create_directory_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tenants (
            id          TEXT PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS users (
            id                      TEXT PRIMARY KEY NOT NULL,
            tenant_id               TEXT NOT NULL REFERENCES tenants(id),
            email                   TEXT NOT NULL,
            name                    TEXT NOT NULL,
            role                    TEXT NOT NULL DEFAULT 'agent',
            digest_opt_out          INTEGER NOT NULL DEFAULT 0,
            email_renewal_reminders INTEGER NOT NULL DEFAULT 1,
            notify_budget_alerts    INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_users_tenant ON users (tenant_id);
        CREATE TABLE IF NOT EXISTS clients (
            id          TEXT PRIMARY KEY NOT NULL,
            tenant_id   TEXT NOT NULL REFERENCES tenants(id),
            name        TEXT NOT NULL
        );",
    )
}

fn create_policies_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS policies (
            id              TEXT PRIMARY KEY NOT NULL,
            tenant_id       TEXT NOT NULL REFERENCES tenants(id),
            client_id       TEXT NOT NULL REFERENCES clients(id),
            policy_type     TEXT NOT NULL,
            end_date        TEXT,               -- YYYY-MM-DD or NULL
            status          TEXT NOT NULL DEFAULT 'active',
            created_by_id   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_policies_renewable
            ON policies (status, end_date);",
    )
}

fn create_tasks_table(conn: &Connection) -> Result<()> {
    // idx_tasks_open_renewal closes the read-then-write race in the renewal
    // generator: a second open task for the same milestone is rejected.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id                  TEXT PRIMARY KEY NOT NULL,
            tenant_id           TEXT NOT NULL REFERENCES tenants(id),
            task_type           TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'todo',
            priority            TEXT NOT NULL DEFAULT 'medium',
            title               TEXT NOT NULL,
            description         TEXT,
            due_date            TEXT,
            policy_id           TEXT REFERENCES policies(id),
            client_id           TEXT REFERENCES clients(id),
            renewal_days_before INTEGER,
            assigned_to_id      TEXT,
            created_by_id       TEXT NOT NULL,
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_tenant_due ON tasks (tenant_id, due_date);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_open_renewal
            ON tasks (policy_id, renewal_days_before)
            WHERE task_type = 'renewal' AND status != 'done';",
    )
}

fn create_budget_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS budgets (
            id              TEXT PRIMARY KEY NOT NULL,
            tenant_id       TEXT NOT NULL REFERENCES tenants(id),
            name            TEXT NOT NULL,
            total_limit     TEXT NOT NULL,      -- decimal string
            start_date      TEXT NOT NULL,
            end_date        TEXT NOT NULL,
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_by_id   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_budgets_active ON budgets (is_active, end_date);
        CREATE TABLE IF NOT EXISTS budget_categories (
            budget_id       TEXT NOT NULL REFERENCES budgets(id) ON DELETE CASCADE,
            category        TEXT NOT NULL,
            limit_amount    TEXT NOT NULL,
            PRIMARY KEY (budget_id, category)
        );",
    )
}

fn create_expenses_table(conn: &Connection) -> Result<()> {
    // One child per (parent, occurrence date): a duplicate spawn fails loudly.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS expenses (
            id                  TEXT PRIMARY KEY NOT NULL,
            tenant_id           TEXT NOT NULL REFERENCES tenants(id),
            amount              TEXT NOT NULL,
            category            TEXT NOT NULL,
            description         TEXT,
            date                TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'draft',
            is_recurring        INTEGER NOT NULL DEFAULT 0,
            recurrence          TEXT,
            budget_id           TEXT REFERENCES budgets(id),
            parent_expense_id   TEXT REFERENCES expenses(id),
            next_occurrence     TEXT,
            created_by_id       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_expenses_recurring
            ON expenses (is_recurring, next_occurrence);
        CREATE INDEX IF NOT EXISTS idx_expenses_budget ON expenses (budget_id, status);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_expenses_child_occurrence
            ON expenses (parent_expense_id, date)
            WHERE parent_expense_id IS NOT NULL;",
    )
}

fn create_alerts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS alerts (
            id          TEXT PRIMARY KEY NOT NULL,
            tenant_id   TEXT NOT NULL REFERENCES tenants(id),
            user_id     TEXT NOT NULL,
            alert_type  TEXT NOT NULL,
            title       TEXT NOT NULL,
            message     TEXT NOT NULL,
            metadata    TEXT NOT NULL DEFAULT '{}',  -- JSON
            is_read     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_alerts_type ON alerts (tenant_id, alert_type);",
    )
}
