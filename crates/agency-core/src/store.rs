//! Abstract tenant-scoped store the scheduling jobs read from and write to.
//!
//! Every method takes its `TenantId` explicitly except the few "all tenants"
//! batch reads, which return records carrying their own tenant id. Jobs never
//! rely on ambient request context.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::types::*;

pub trait TenantStore: Send + Sync {
    fn list_tenants(&self) -> Result<Vec<Tenant>>;
}

pub trait UserStore: Send + Sync {
    fn list_users(&self, tenant_id: &TenantId) -> Result<Vec<User>>;
}

pub trait PolicyStore: Send + Sync {
    /// Policies of the tenant with an end date and a renewable status.
    fn list_renewable_policies_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<RenewablePolicy>>;

    /// Any policy in the tenant, joined with its client name, regardless of status.
    fn get_policy(&self, tenant_id: &TenantId, policy_id: &PolicyId) -> Result<Option<RenewablePolicy>>;
}

pub trait TaskStore: Send + Sync {
    /// The open (non-done) renewal task for `(policy_id, days_before)`, if any.
    fn find_open_renewal_task(
        &self,
        tenant_id: &TenantId,
        policy_id: &PolicyId,
        days_before: u32,
    ) -> Result<Option<Task>>;

    /// True when a done renewal task for `(policy_id, days_before)` has its
    /// due date within `[from, to]`.
    fn has_completed_renewal_task(
        &self,
        tenant_id: &TenantId,
        policy_id: &PolicyId,
        days_before: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<bool>;

    /// Insert a renewal task. Returns `None` when an open task for the same
    /// `(policy_id, renewal_days_before)` already exists, which implementations
    /// may detect through a unique index rather than a prior read.
    fn create_renewal_task(&self, task: &NewRenewalTask) -> Result<Option<Task>>;

    /// Delete every non-done renewal task of the policy; returns the count removed.
    fn delete_open_renewal_tasks(&self, tenant_id: &TenantId, policy_id: &PolicyId) -> Result<usize>;

    /// Status is the only externally mutable task field.
    fn update_task_status(&self, tenant_id: &TenantId, task_id: &TaskId, status: TaskStatus) -> Result<()>;

    /// Tasks of any type with `due_date < today` and status other than done.
    fn list_overdue_tasks(&self, tenant_id: &TenantId, today: NaiveDate) -> Result<Vec<Task>>;

    /// `todo` renewal tasks with `from <= due_date <= to`.
    fn list_renewal_milestones(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Task>>;
}

pub trait BudgetStore: Send + Sync {
    fn get_budget(&self, tenant_id: &TenantId, budget_id: &BudgetId) -> Result<Option<Budget>>;

    /// Active budgets in every tenant whose `end_date` is before `today`.
    fn list_elapsed_active_budgets(&self, today: NaiveDate) -> Result<Vec<Budget>>;

    fn find_budget_by_name_and_start(
        &self,
        tenant_id: &TenantId,
        name: &str,
        start_date: NaiveDate,
    ) -> Result<Option<Budget>>;

    fn deactivate_budget(&self, tenant_id: &TenantId, budget_id: &BudgetId) -> Result<()>;

    /// Deactivate `source_id` and insert `successor` as one atomic step.
    fn supersede_budget(
        &self,
        tenant_id: &TenantId,
        source_id: &BudgetId,
        successor: &NewBudget,
    ) -> Result<Budget>;
}

pub trait ExpenseStore: Send + Sync {
    /// Recurring expenses in every tenant whose cursor is on or before `today`.
    fn list_due_recurring_expenses(&self, today: NaiveDate) -> Result<Vec<Expense>>;

    /// Insert `children` and move the parent's cursor from `expected_cursor` to
    /// `next_occurrence` atomically. Returns `None` without writing anything when
    /// the stored cursor no longer equals `expected_cursor` (another run won).
    fn spawn_recurring_children(
        &self,
        parent: &Expense,
        expected_cursor: NaiveDate,
        children: &[NewExpense],
        next_occurrence: NaiveDate,
    ) -> Result<Option<Vec<Expense>>>;

    /// Sum of approved expense amounts linked to the budget.
    fn approved_total_for_budget(&self, tenant_id: &TenantId, budget_id: &BudgetId) -> Result<Decimal>;
}

pub trait AlertStore: Send + Sync {
    /// True when an alert of `alert_type` exists in the tenant whose metadata matches `key`.
    fn has_existing_alert(&self, tenant_id: &TenantId, alert_type: AlertType, key: &AlertKey) -> Result<bool>;

    fn create_alert(&self, tenant_id: &TenantId, user_id: &UserId, alert: &NewAlert) -> Result<Alert>;
}

/// Everything the scheduling engine needs from persistence.
pub trait Store: TenantStore + UserStore + PolicyStore + TaskStore + BudgetStore + ExpenseStore + AlertStore {}

impl<T> Store for T where
    T: TenantStore + UserStore + PolicyStore + TaskStore + BudgetStore + ExpenseStore + AlertStore
{
}

/// Deduplication key for alerts: a set of metadata fields that must all be
/// present on an existing alert with string-equal values.
///
/// Values compare by their string form, so `{"budgetId": "b1"}` matches
/// metadata `{"budgetId": "b1", "percentage": 91}` but numeric `5` and string
/// `"5"` are also equal. Keys absent from the key are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlertKey {
    fields: BTreeMap<String, String>,
}

impl AlertKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    /// Key for `budget_warning` alerts: one alert per budget, ever.
    pub fn budget_warning(budget_id: &BudgetId) -> Self {
        Self::new().with("budgetId", budget_id)
    }

    /// The metadata object an alert created for this key should carry.
    pub fn to_metadata(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn matches(&self, metadata: &serde_json::Value) -> bool {
        let Some(object) = metadata.as_object() else {
            return self.fields.is_empty();
        };
        self.fields.iter().all(|(key, expected)| match object.get(key) {
            Some(serde_json::Value::String(s)) => s == expected,
            Some(serde_json::Value::Null) | None => false,
            Some(other) => &other.to_string() == expected,
        })
    }
}
