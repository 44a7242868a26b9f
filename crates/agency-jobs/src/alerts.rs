//! Budget threshold alerts raised from the expense approval path.

use std::sync::Arc;

use agency_core::types::{AlertType, BudgetId, Expense, ExpenseStatus, NewAlert, TenantId};
use agency_core::{AgencyError, AlertKey, Result, Store};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

pub struct BudgetAlerts {
    store: Arc<dyn Store>,
    warning_percent: Decimal,
}

impl BudgetAlerts {
    pub fn new(store: Arc<dyn Store>, warning_percent: u32) -> Self {
        Self {
            store,
            warning_percent: Decimal::from(warning_percent),
        }
    }

    /// Entry point for the approval path. Expenses that are not approved or
    /// not linked to a budget are ignored.
    pub fn on_expense_approved(&self, tenant_id: &TenantId, expense: &Expense) -> Result<usize> {
        if expense.status != ExpenseStatus::Approved {
            return Ok(0);
        }
        match &expense.budget_id {
            Some(budget_id) => self.check_budget_threshold(tenant_id, budget_id),
            None => Ok(0),
        }
    }

    /// Raise one `budget_warning` alert per opted-in admin the first time the
    /// approved spend of a budget reaches the warning percentage. Returns the
    /// number of alerts created.
    pub fn check_budget_threshold(&self, tenant_id: &TenantId, budget_id: &BudgetId) -> Result<usize> {
        let budget = self
            .store
            .get_budget(tenant_id, budget_id)?
            .ok_or_else(|| AgencyError::not_found("Budget", budget_id))?;
        if budget.total_limit <= Decimal::ZERO {
            return Ok(0);
        }

        let spent = self.store.approved_total_for_budget(tenant_id, budget_id)?;
        let percentage = spent
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.checked_div(budget.total_limit))
            .ok_or_else(|| {
                AgencyError::Internal(format!("spend percentage of budget {budget_id} overflowed"))
            })?;
        if percentage < self.warning_percent {
            return Ok(0);
        }

        let key = AlertKey::budget_warning(budget_id);
        if self.store.has_existing_alert(tenant_id, AlertType::BudgetWarning, &key)? {
            debug!(%tenant_id, %budget_id, "budget warning already raised");
            return Ok(0);
        }

        let rounded = percentage.round_dp(1);
        let mut metadata = key.to_metadata();
        metadata["percentage"] = serde_json::json!(rounded.to_f64().unwrap_or_default());
        let alert = NewAlert {
            alert_type: AlertType::BudgetWarning,
            title: format!("Budget warning: {}", budget.name),
            message: format!(
                "{} has used {}% of its {} limit ({} spent).",
                budget.name,
                rounded,
                budget.total_limit.round_dp(2),
                spent.round_dp(2),
            ),
            metadata,
        };

        let mut created = 0;
        let recipients = self
            .store
            .list_users(tenant_id)?
            .into_iter()
            .filter(|u| u.role.is_admin() && u.notify_budget_alerts);
        for user in recipients {
            match self.store.create_alert(tenant_id, &user.id, &alert) {
                Ok(_) => created += 1,
                Err(e) => warn!(%tenant_id, %budget_id, user_id = %user.id, "creating budget alert failed: {e}"),
            }
        }
        info!(%tenant_id, %budget_id, percentage = %rounded, created, "budget warning raised");
        Ok(created)
    }
}
