use std::sync::Mutex;

use agency_core::store::*;
use agency_core::types::*;
use agency_core::AgencyError;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tracing::debug;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::rows::*;

/// SQLite-backed implementation of every store trait the jobs consume.
///
/// Thread-safe: wraps the connection in a Mutex. Each trait call holds the
/// lock for the duration of one statement or one transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut conn)
    }

    /// Trait-boundary variant: converts `StoreError` into `AgencyError`.
    fn call<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> agency_core::Result<T> {
        self.with_conn(f).map_err(AgencyError::from)
    }
}

pub(crate) fn load_categories(conn: &Connection, budget: &mut Budget) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "SELECT category, limit_amount FROM budget_categories
         WHERE budget_id = ?1 ORDER BY category",
    )?;
    budget.categories = stmt
        .query_map([budget.id.as_str()], |row| {
            Ok(BudgetCategory {
                category: row.get(0)?,
                limit_amount: decimal(row, 1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(())
}

pub(crate) fn insert_budget(conn: &Connection, budget: &NewBudget) -> Result<Budget> {
    let id = BudgetId::new();
    conn.execute(
        "INSERT INTO budgets
         (id, tenant_id, name, total_limit, start_date, end_date, is_active, created_by_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
        params![
            id.as_str(),
            budget.tenant_id.as_str(),
            budget.name,
            budget.total_limit.to_string(),
            budget.start_date,
            budget.end_date,
            budget.created_by_id.as_str(),
        ],
    )?;
    for cat in &budget.categories {
        conn.execute(
            "INSERT INTO budget_categories (budget_id, category, limit_amount)
             VALUES (?1, ?2, ?3)",
            params![id.as_str(), cat.category, cat.limit_amount.to_string()],
        )?;
    }
    Ok(Budget {
        id,
        tenant_id: budget.tenant_id.clone(),
        name: budget.name.clone(),
        total_limit: budget.total_limit,
        start_date: budget.start_date,
        end_date: budget.end_date,
        is_active: true,
        created_by_id: budget.created_by_id.clone(),
        categories: budget.categories.clone(),
    })
}

pub(crate) fn insert_expense(conn: &Connection, expense: &NewExpense) -> Result<Expense> {
    let id = ExpenseId::new();
    conn.execute(
        "INSERT INTO expenses
         (id, tenant_id, amount, category, description, date, status, is_recurring,
          recurrence, budget_id, parent_expense_id, next_occurrence, created_by_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            id.as_str(),
            expense.tenant_id.as_str(),
            expense.amount.to_string(),
            expense.category,
            expense.description,
            expense.date,
            expense.status.as_str(),
            expense.is_recurring as i64,
            expense.recurrence.map(|r| r.as_str()),
            expense.budget_id.as_ref().map(|b| b.as_str()),
            expense.parent_expense_id.as_ref().map(|p| p.as_str()),
            expense.next_occurrence,
            expense.created_by_id.as_str(),
        ],
    )?;
    Ok(Expense {
        id,
        tenant_id: expense.tenant_id.clone(),
        amount: expense.amount,
        category: expense.category.clone(),
        description: expense.description.clone(),
        date: expense.date,
        status: expense.status,
        is_recurring: expense.is_recurring,
        recurrence: expense.recurrence,
        budget_id: expense.budget_id.clone(),
        parent_expense_id: expense.parent_expense_id.clone(),
        next_occurrence: expense.next_occurrence,
        created_by_id: expense.created_by_id.clone(),
    })
}

fn query_policies(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<RenewablePolicy>> {
    let sql = format!(
        "SELECT {POLICY_COLUMNS} FROM policies p
         JOIN clients c ON c.id = p.client_id
         WHERE {filter}
         ORDER BY p.tenant_id, p.end_date, p.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(args, row_to_policy)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

const RENEWABLE_FILTER: &str =
    "p.end_date IS NOT NULL AND p.status IN ('active', 'pending_renewal')";

impl TenantStore for SqliteStore {
    fn list_tenants(&self) -> agency_core::Result<Vec<Tenant>> {
        self.call(|conn| {
            let mut stmt = conn.prepare_cached("SELECT id, name FROM tenants ORDER BY id")?;
            let tenants = stmt
                .query_map([], row_to_tenant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tenants)
        })
    }
}

impl UserStore for SqliteStore {
    fn list_users(&self, tenant_id: &TenantId) -> agency_core::Result<Vec<User>> {
        self.call(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE tenant_id = ?1 ORDER BY id");
            let mut stmt = conn.prepare_cached(&sql)?;
            let users = stmt
                .query_map([tenant_id.as_str()], row_to_user)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
    }
}

impl PolicyStore for SqliteStore {
    fn list_renewable_policies_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> agency_core::Result<Vec<RenewablePolicy>> {
        self.call(|conn| {
            let filter = format!("{RENEWABLE_FILTER} AND p.tenant_id = ?1");
            query_policies(conn, &filter, &[&tenant_id.as_str()])
        })
    }

    fn get_policy(
        &self,
        tenant_id: &TenantId,
        policy_id: &PolicyId,
    ) -> agency_core::Result<Option<RenewablePolicy>> {
        self.call(|conn| {
            let found = query_policies(
                conn,
                "p.tenant_id = ?1 AND p.id = ?2",
                &[&tenant_id.as_str(), &policy_id.as_str()],
            )?;
            Ok(found.into_iter().next())
        })
    }
}

impl TaskStore for SqliteStore {
    fn find_open_renewal_task(
        &self,
        tenant_id: &TenantId,
        policy_id: &PolicyId,
        days_before: u32,
    ) -> agency_core::Result<Option<Task>> {
        self.call(|conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE tenant_id = ?1 AND policy_id = ?2 AND renewal_days_before = ?3
                   AND task_type = 'renewal' AND status != 'done'
                 LIMIT 1"
            );
            let task = conn
                .query_row(
                    &sql,
                    params![tenant_id.as_str(), policy_id.as_str(), days_before],
                    row_to_task,
                )
                .optional()?;
            Ok(task)
        })
    }

    fn has_completed_renewal_task(
        &self,
        tenant_id: &TenantId,
        policy_id: &PolicyId,
        days_before: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> agency_core::Result<bool> {
        self.call(|conn| {
            let found: i64 = conn.query_row(
                "SELECT EXISTS (
                    SELECT 1 FROM tasks
                    WHERE tenant_id = ?1 AND policy_id = ?2 AND renewal_days_before = ?3
                      AND task_type = 'renewal' AND status = 'done'
                      AND due_date >= ?4 AND due_date <= ?5
                 )",
                params![tenant_id.as_str(), policy_id.as_str(), days_before, from, to],
                |row| row.get(0),
            )?;
            Ok(found != 0)
        })
    }

    fn create_renewal_task(&self, task: &NewRenewalTask) -> agency_core::Result<Option<Task>> {
        self.call(|conn| {
            let id = TaskId::new();
            let now = Utc::now();
            let inserted = conn.execute(
                "INSERT INTO tasks
                 (id, tenant_id, task_type, status, priority, title, description, due_date,
                  policy_id, client_id, renewal_days_before, assigned_to_id, created_by_id,
                  created_at)
                 VALUES (?1, ?2, 'renewal', 'todo', ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?11)",
                params![
                    id.as_str(),
                    task.tenant_id.as_str(),
                    task.priority.as_str(),
                    task.title,
                    task.description,
                    task.due_date,
                    task.policy_id.as_str(),
                    task.client_id.as_str(),
                    task.renewal_days_before,
                    task.created_by_id.as_str(),
                    now,
                ],
            );
            match inserted.map_err(StoreError::from) {
                Ok(_) => Ok(Some(Task {
                    id,
                    tenant_id: task.tenant_id.clone(),
                    task_type: TaskType::Renewal,
                    status: TaskStatus::Todo,
                    priority: task.priority,
                    title: task.title.clone(),
                    description: Some(task.description.clone()),
                    due_date: Some(task.due_date),
                    policy_id: Some(task.policy_id.clone()),
                    client_id: Some(task.client_id.clone()),
                    renewal_days_before: Some(task.renewal_days_before),
                    assigned_to_id: None,
                    created_by_id: task.created_by_id.clone(),
                    created_at: now,
                })),
                Err(e) if e.is_constraint_violation() => {
                    debug!(
                        policy_id = %task.policy_id,
                        days_before = task.renewal_days_before,
                        "open renewal task already exists"
                    );
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
    }

    fn delete_open_renewal_tasks(
        &self,
        tenant_id: &TenantId,
        policy_id: &PolicyId,
    ) -> agency_core::Result<usize> {
        self.call(|conn| {
            let n = conn.execute(
                "DELETE FROM tasks
                 WHERE tenant_id = ?1 AND policy_id = ?2
                   AND task_type = 'renewal' AND status != 'done'",
                params![tenant_id.as_str(), policy_id.as_str()],
            )?;
            Ok(n)
        })
    }

    fn update_task_status(
        &self,
        tenant_id: &TenantId,
        task_id: &TaskId,
        status: TaskStatus,
    ) -> agency_core::Result<()> {
        let n = self.call(|conn| {
            Ok(conn.execute(
                "UPDATE tasks SET status = ?3 WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.as_str(), task_id.as_str(), status.as_str()],
            )?)
        })?;
        if n == 0 {
            return Err(AgencyError::not_found("Task", task_id));
        }
        Ok(())
    }

    fn list_overdue_tasks(
        &self,
        tenant_id: &TenantId,
        today: NaiveDate,
    ) -> agency_core::Result<Vec<Task>> {
        self.call(|conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE tenant_id = ?1 AND due_date IS NOT NULL AND due_date < ?2
                   AND status != 'done'
                 ORDER BY due_date, id"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let tasks = stmt
                .query_map(params![tenant_id.as_str(), today], row_to_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    fn list_renewal_milestones(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> agency_core::Result<Vec<Task>> {
        self.call(|conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE tenant_id = ?1 AND task_type = 'renewal' AND status = 'todo'
                   AND due_date >= ?2 AND due_date <= ?3
                 ORDER BY due_date, id"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let tasks = stmt
                .query_map(params![tenant_id.as_str(), from, to], row_to_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }
}

impl BudgetStore for SqliteStore {
    fn get_budget(
        &self,
        tenant_id: &TenantId,
        budget_id: &BudgetId,
    ) -> agency_core::Result<Option<Budget>> {
        self.call(|conn| {
            let sql = format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE tenant_id = ?1 AND id = ?2");
            let budget = conn
                .query_row(&sql, params![tenant_id.as_str(), budget_id.as_str()], row_to_budget)
                .optional()?;
            match budget {
                Some(mut b) => {
                    load_categories(conn, &mut b)?;
                    Ok(Some(b))
                }
                None => Ok(None),
            }
        })
    }

    fn list_elapsed_active_budgets(&self, today: NaiveDate) -> agency_core::Result<Vec<Budget>> {
        self.call(|conn| {
            let sql = format!(
                "SELECT {BUDGET_COLUMNS} FROM budgets
                 WHERE is_active = 1 AND end_date < ?1
                 ORDER BY tenant_id, end_date, id"
            );
            let mut budgets = {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([today], row_to_budget)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            for budget in &mut budgets {
                load_categories(conn, budget)?;
            }
            Ok(budgets)
        })
    }

    fn find_budget_by_name_and_start(
        &self,
        tenant_id: &TenantId,
        name: &str,
        start_date: NaiveDate,
    ) -> agency_core::Result<Option<Budget>> {
        self.call(|conn| {
            let sql = format!(
                "SELECT {BUDGET_COLUMNS} FROM budgets
                 WHERE tenant_id = ?1 AND name = ?2 AND start_date = ?3
                 LIMIT 1"
            );
            let budget = conn
                .query_row(&sql, params![tenant_id.as_str(), name, start_date], row_to_budget)
                .optional()?;
            match budget {
                Some(mut b) => {
                    load_categories(conn, &mut b)?;
                    Ok(Some(b))
                }
                None => Ok(None),
            }
        })
    }

    fn deactivate_budget(&self, tenant_id: &TenantId, budget_id: &BudgetId) -> agency_core::Result<()> {
        let n = self.call(|conn| {
            Ok(conn.execute(
                "UPDATE budgets SET is_active = 0 WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.as_str(), budget_id.as_str()],
            )?)
        })?;
        if n == 0 {
            return Err(AgencyError::not_found("Budget", budget_id));
        }
        Ok(())
    }

    fn supersede_budget(
        &self,
        tenant_id: &TenantId,
        source_id: &BudgetId,
        successor: &NewBudget,
    ) -> agency_core::Result<Budget> {
        let created = self.call(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE budgets SET is_active = 0 WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.as_str(), source_id.as_str()],
            )?;
            if n == 0 {
                return Ok(None);
            }
            let budget = insert_budget(&tx, successor)?;
            tx.commit()?;
            Ok(Some(budget))
        })?;
        created.ok_or_else(|| AgencyError::not_found("Budget", source_id))
    }
}

impl ExpenseStore for SqliteStore {
    fn list_due_recurring_expenses(&self, today: NaiveDate) -> agency_core::Result<Vec<Expense>> {
        self.call(|conn| {
            let sql = format!(
                "SELECT {EXPENSE_COLUMNS} FROM expenses
                 WHERE is_recurring = 1
                   AND next_occurrence IS NOT NULL AND next_occurrence <= ?1
                 ORDER BY tenant_id, next_occurrence, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let expenses = stmt
                .query_map([today], row_to_expense)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(expenses)
        })
    }

    fn spawn_recurring_children(
        &self,
        parent: &Expense,
        expected_cursor: NaiveDate,
        children: &[NewExpense],
        next_occurrence: NaiveDate,
    ) -> agency_core::Result<Option<Vec<Expense>>> {
        self.call(|conn| {
            let tx = conn.transaction()?;
            // Optimistic cursor check: only the run that still sees the old
            // cursor may spawn children for it.
            let advanced = tx.execute(
                "UPDATE expenses SET next_occurrence = ?3
                 WHERE tenant_id = ?1 AND id = ?2 AND next_occurrence = ?4",
                params![
                    parent.tenant_id.as_str(),
                    parent.id.as_str(),
                    next_occurrence,
                    expected_cursor
                ],
            )?;
            if advanced == 0 {
                return Ok(None);
            }
            let mut created = Vec::with_capacity(children.len());
            for child in children {
                created.push(insert_expense(&tx, child)?);
            }
            tx.commit()?;
            Ok(Some(created))
        })
    }

    fn approved_total_for_budget(
        &self,
        tenant_id: &TenantId,
        budget_id: &BudgetId,
    ) -> agency_core::Result<Decimal> {
        self.call(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT amount FROM expenses
                 WHERE tenant_id = ?1 AND budget_id = ?2 AND status = 'approved'",
            )?;
            let amounts = stmt
                .query_map(params![tenant_id.as_str(), budget_id.as_str()], |row| {
                    decimal(row, 0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            amounts
                .into_iter()
                .try_fold(Decimal::ZERO, |total, amount| total.checked_add(amount))
                .ok_or_else(|| StoreError::Overflow(format!("approved total of budget {budget_id}")))
        })
    }
}

impl AlertStore for SqliteStore {
    fn has_existing_alert(
        &self,
        tenant_id: &TenantId,
        alert_type: AlertType,
        key: &AlertKey,
    ) -> agency_core::Result<bool> {
        self.call(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT metadata FROM alerts WHERE tenant_id = ?1 AND alert_type = ?2",
            )?;
            let mut rows = stmt.query(params![tenant_id.as_str(), alert_type.as_str()])?;
            while let Some(row) = rows.next()? {
                let raw: String = row.get(0)?;
                // Unparseable metadata can never match a key.
                let Ok(metadata) = serde_json::from_str::<serde_json::Value>(&raw) else {
                    continue;
                };
                if key.matches(&metadata) {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    fn create_alert(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        alert: &NewAlert,
    ) -> agency_core::Result<Alert> {
        self.call(|conn| {
            let id = AlertId::new();
            let now = Utc::now();
            let metadata = serde_json::to_string(&alert.metadata)?;
            conn.execute(
                "INSERT INTO alerts
                 (id, tenant_id, user_id, alert_type, title, message, metadata, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
                params![
                    id.as_str(),
                    tenant_id.as_str(),
                    user_id.as_str(),
                    alert.alert_type.as_str(),
                    alert.title,
                    alert.message,
                    metadata,
                    now,
                ],
            )?;
            Ok(Alert {
                id,
                tenant_id: tenant_id.clone(),
                user_id: user_id.clone(),
                alert_type: alert.alert_type,
                title: alert.title.clone(),
                message: alert.message.clone(),
                metadata: alert.metadata.clone(),
                is_read: false,
                created_at: now,
            })
        })
    }
}
