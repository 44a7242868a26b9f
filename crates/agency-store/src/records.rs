//! Plain CRUD used by the request path (and fixtures) to seed the records the
//! scheduling jobs consume. None of this carries scheduling logic.

use agency_core::types::*;
use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::rows::*;
use crate::store::{insert_budget, insert_expense, load_categories, SqliteStore};

impl SqliteStore {
    pub fn insert_tenant(&self, tenant: &Tenant) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tenants (id, name) VALUES (?1, ?2)",
                params![tenant.id.as_str(), tenant.name],
            )?;
            Ok(())
        })
    }

    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users
                 (id, tenant_id, email, name, role, digest_opt_out,
                  email_renewal_reminders, notify_budget_alerts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.as_str(),
                    user.tenant_id.as_str(),
                    user.email,
                    user.name,
                    user.role.as_str(),
                    user.digest_opt_out as i64,
                    user.email_renewal_reminders as i64,
                    user.notify_budget_alerts as i64,
                ],
            )?;
            Ok(())
        })
    }

    pub fn insert_client(&self, client: &Client) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO clients (id, tenant_id, name) VALUES (?1, ?2, ?3)",
                params![client.id.as_str(), client.tenant_id.as_str(), client.name],
            )?;
            Ok(())
        })
    }

    pub fn insert_policy(&self, policy: &Policy) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO policies
                 (id, tenant_id, client_id, policy_type, end_date, status, created_by_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    policy.id.as_str(),
                    policy.tenant_id.as_str(),
                    policy.client_id.as_str(),
                    policy.policy_type,
                    policy.end_date,
                    policy.status.as_str(),
                    policy.created_by_id.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    /// Overwrite the mutable policy fields (type, end date, status).
    pub fn update_policy(&self, policy: &Policy) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE policies SET policy_type = ?3, end_date = ?4, status = ?5
                 WHERE tenant_id = ?1 AND id = ?2",
                params![
                    policy.tenant_id.as_str(),
                    policy.id.as_str(),
                    policy.policy_type,
                    policy.end_date,
                    policy.status.as_str(),
                ],
            )?)
        })
    }

    /// Insert a general (non-generated) task.
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks
                 (id, tenant_id, task_type, status, priority, title, description, due_date,
                  policy_id, client_id, renewal_days_before, assigned_to_id, created_by_id,
                  created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    task.id.as_str(),
                    task.tenant_id.as_str(),
                    task.task_type.as_str(),
                    task.status.as_str(),
                    task.priority.as_str(),
                    task.title,
                    task.description,
                    task.due_date,
                    task.policy_id.as_ref().map(|p| p.as_str()),
                    task.client_id.as_ref().map(|c| c.as_str()),
                    task.renewal_days_before,
                    task.assigned_to_id.as_ref().map(|u| u.as_str()),
                    task.created_by_id.as_str(),
                    task.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_tasks_for_policy(&self, tenant_id: &TenantId, policy_id: &PolicyId) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE tenant_id = ?1 AND policy_id = ?2
                 ORDER BY due_date, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let tasks = stmt
                .query_map(params![tenant_id.as_str(), policy_id.as_str()], row_to_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    pub fn list_tasks(&self, tenant_id: &TenantId) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE tenant_id = ?1 ORDER BY due_date, id");
            let mut stmt = conn.prepare(&sql)?;
            let tasks = stmt
                .query_map([tenant_id.as_str()], row_to_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    pub fn create_budget(&self, budget: &NewBudget) -> Result<Budget> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let created = insert_budget(&tx, budget)?;
            tx.commit()?;
            Ok(created)
        })
    }

    pub fn list_budgets(&self, tenant_id: &TenantId) -> Result<Vec<Budget>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {BUDGET_COLUMNS} FROM budgets WHERE tenant_id = ?1 ORDER BY start_date, id"
            );
            let mut budgets = {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([tenant_id.as_str()], row_to_budget)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            for budget in &mut budgets {
                load_categories(conn, budget)?;
            }
            Ok(budgets)
        })
    }

    pub fn create_expense(&self, expense: &NewExpense) -> Result<Expense> {
        self.with_conn(|conn| insert_expense(conn, expense))
    }

    pub fn get_expense(&self, tenant_id: &TenantId, expense_id: &ExpenseId) -> Result<Option<Expense>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE tenant_id = ?1 AND id = ?2");
            Ok(conn
                .query_row(&sql, params![tenant_id.as_str(), expense_id.as_str()], row_to_expense)
                .optional()?)
        })
    }

    pub fn list_child_expenses(&self, tenant_id: &TenantId, parent_id: &ExpenseId) -> Result<Vec<Expense>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {EXPENSE_COLUMNS} FROM expenses
                 WHERE tenant_id = ?1 AND parent_expense_id = ?2
                 ORDER BY date, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let expenses = stmt
                .query_map(params![tenant_id.as_str(), parent_id.as_str()], row_to_expense)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(expenses)
        })
    }

    pub fn set_expense_status(
        &self,
        tenant_id: &TenantId,
        expense_id: &ExpenseId,
        status: ExpenseStatus,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE expenses SET status = ?3 WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.as_str(), expense_id.as_str(), status.as_str()],
            )?)
        })
    }

    pub fn list_alerts(&self, tenant_id: &TenantId) -> Result<Vec<Alert>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ALERT_COLUMNS} FROM alerts WHERE tenant_id = ?1 ORDER BY created_at, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let alerts = stmt
                .query_map([tenant_id.as_str()], row_to_alert)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(alerts)
        })
    }
}
