//! Row → domain mappers. Column order must match the `*_COLUMNS` constants so
//! every query in this crate stays consistent.

use std::str::FromStr;

use agency_core::types::*;
use rusqlite::types::Type;
use rusqlite::Row;
use rust_decimal::Decimal;

pub(crate) const USER_COLUMNS: &str = "id, tenant_id, email, name, role, digest_opt_out, \
     email_renewal_reminders, notify_budget_alerts";

pub(crate) const POLICY_COLUMNS: &str = "p.id, p.tenant_id, p.client_id, p.policy_type, \
     p.end_date, p.status, p.created_by_id, c.name";

pub(crate) const TASK_COLUMNS: &str = "id, tenant_id, task_type, status, priority, title, \
     description, due_date, policy_id, client_id, renewal_days_before, assigned_to_id, \
     created_by_id, created_at";

pub(crate) const BUDGET_COLUMNS: &str =
    "id, tenant_id, name, total_limit, start_date, end_date, is_active, created_by_id";

pub(crate) const EXPENSE_COLUMNS: &str = "id, tenant_id, amount, category, description, date, \
     status, is_recurring, recurrence, budget_id, parent_expense_id, next_occurrence, \
     created_by_id";

pub(crate) const ALERT_COLUMNS: &str =
    "id, tenant_id, user_id, alert_type, title, message, metadata, is_read, created_at";

/// Parse a TEXT column through `FromStr`, surfacing failures as conversion errors.
fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

fn parse_opt_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
        }),
        None => Ok(None),
    }
}

pub(crate) fn decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    parse_text(row, idx)
}

fn bool_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(row.get::<_, i64>(idx)? != 0)
}

fn opt_id<T: From<String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(T::from))
}

pub(crate) fn row_to_tenant(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: TenantId(row.get(0)?),
        name: row.get(1)?,
    })
}

pub(crate) fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        email: row.get(2)?,
        name: row.get(3)?,
        role: parse_text(row, 4)?,
        digest_opt_out: bool_col(row, 5)?,
        email_renewal_reminders: bool_col(row, 6)?,
        notify_budget_alerts: bool_col(row, 7)?,
    })
}

pub(crate) fn row_to_policy(row: &Row<'_>) -> rusqlite::Result<RenewablePolicy> {
    Ok(RenewablePolicy {
        policy: Policy {
            id: PolicyId(row.get(0)?),
            tenant_id: TenantId(row.get(1)?),
            client_id: ClientId(row.get(2)?),
            policy_type: row.get(3)?,
            end_date: row.get(4)?,
            status: parse_text(row, 5)?,
            created_by_id: UserId(row.get(6)?),
        },
        client_name: row.get(7)?,
    })
}

pub(crate) fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: TaskId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        task_type: parse_text(row, 2)?,
        status: parse_text(row, 3)?,
        priority: parse_text(row, 4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        due_date: row.get(7)?,
        policy_id: opt_id(row, 8)?,
        client_id: opt_id(row, 9)?,
        renewal_days_before: row.get(10)?,
        assigned_to_id: opt_id(row, 11)?,
        created_by_id: UserId(row.get(12)?),
        created_at: row.get(13)?,
    })
}

/// Budget without categories; callers attach them with a second query.
pub(crate) fn row_to_budget(row: &Row<'_>) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: BudgetId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        name: row.get(2)?,
        total_limit: decimal(row, 3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        is_active: bool_col(row, 6)?,
        created_by_id: UserId(row.get(7)?),
        categories: Vec::new(),
    })
}

pub(crate) fn row_to_expense(row: &Row<'_>) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: ExpenseId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        amount: decimal(row, 2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        date: row.get(5)?,
        status: parse_text(row, 6)?,
        is_recurring: bool_col(row, 7)?,
        recurrence: parse_opt_text(row, 8)?,
        budget_id: opt_id(row, 9)?,
        parent_expense_id: opt_id(row, 10)?,
        next_occurrence: row.get(11)?,
        created_by_id: UserId(row.get(12)?),
    })
}

pub(crate) fn row_to_alert(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let metadata: String = row.get(6)?;
    Ok(Alert {
        id: AlertId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        alert_type: parse_text(row, 3)?,
        title: row.get(4)?,
        message: row.get(5)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        is_read: bool_col(row, 7)?,
        created_at: row.get(8)?,
    })
}
