//! Monthly budget auto-renewal and the manual renew operation.

use std::sync::Arc;

use agency_core::types::{Budget, BudgetId, NewBudget, TenantId, UserId};
use agency_core::{AgencyError, Result, Store};
use agency_scheduler::JobReport;
use chrono::{Datelike, Days, Months, NaiveDate};
use tracing::{debug, info, warn};

const RENEWED_SUFFIX: &str = " (Renewed)";

/// Name of a budget's successor: the source name plus " (Renewed)".
pub fn successor_name(name: &str) -> String {
    format!("{name}{RENEWED_SUFFIX}")
}

fn last_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let first = date.with_day(1)?;
    first.checked_add_months(Months::new(1))?.pred_opt()
}

/// The period immediately after `[start, end]` with the same shape.
///
/// Periods covering whole calendar months shift by that many months, so a
/// January budget is followed by all of February. Any other period shifts by
/// its length in days.
pub fn next_period(start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let month_aligned = start.day() == 1 && last_day_of_month(end) == Some(end);
    if month_aligned {
        let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32 + 1;
        let months = Months::new(u32::try_from(months).ok()?);
        let next_start = start.checked_add_months(months)?;
        let next_end = last_day_of_month(next_start.checked_add_months(months)?.pred_opt()?)?;
        Some((next_start, next_end))
    } else {
        let length = u64::try_from((end - start).num_days()).ok()?;
        let next_start = end.succ_opt()?;
        Some((next_start, next_start.checked_add_days(Days::new(length))?))
    }
}

fn successor(source: &Budget, start: NaiveDate, end: NaiveDate, created_by: &UserId) -> NewBudget {
    NewBudget {
        tenant_id: source.tenant_id.clone(),
        name: successor_name(&source.name),
        total_limit: source.total_limit,
        start_date: start,
        end_date: end,
        created_by_id: created_by.clone(),
        categories: source.categories.clone(),
    }
}

fn period_error(budget: &Budget) -> AgencyError {
    AgencyError::Internal(format!(
        "cannot compute the period after {}..{} for budget {}",
        budget.start_date, budget.end_date, budget.id
    ))
}

#[derive(Clone)]
pub struct BudgetRenewals {
    store: Arc<dyn Store>,
}

impl BudgetRenewals {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Deactivate `budget_id` and create its successor for the following period.
    pub fn renew(&self, tenant_id: &TenantId, user_id: &UserId, budget_id: &BudgetId) -> Result<Budget> {
        let source = self
            .store
            .get_budget(tenant_id, budget_id)?
            .ok_or_else(|| AgencyError::not_found("Budget", budget_id))?;
        let (start, end) = next_period(source.start_date, source.end_date).ok_or_else(|| period_error(&source))?;
        let renewed = self
            .store
            .supersede_budget(tenant_id, &source.id, &successor(&source, start, end, user_id))?;
        info!(%tenant_id, budget_id = %source.id, successor_id = %renewed.id, "budget renewed");
        Ok(renewed)
    }

    /// Renew every active budget whose period ended before `today`.
    ///
    /// The successor's period is the first same-shaped period that has not
    /// ended yet, so a budget left stale for several cycles is not renewed
    /// into another already-elapsed period. A successor that already exists
    /// (same name and start date) is not created twice; the source is only
    /// deactivated.
    pub fn auto_renew_budgets_for_all_tenants(&self, today: NaiveDate) -> Result<JobReport> {
        let mut report = JobReport::default();
        for budget in self.store.list_elapsed_active_budgets(today)? {
            report.examined += 1;
            match self.auto_renew(&budget, today) {
                Ok(true) => report.changed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        tenant_id = %budget.tenant_id,
                        budget_id = %budget.id,
                        "budget auto-renewal failed: {e}"
                    );
                    report.failed += 1;
                }
            }
        }
        info!(%report, "budget auto-renewal finished");
        Ok(report)
    }

    fn auto_renew(&self, budget: &Budget, today: NaiveDate) -> Result<bool> {
        let (mut start, mut end) = next_period(budget.start_date, budget.end_date).ok_or_else(|| period_error(budget))?;
        while end < today {
            (start, end) = next_period(start, end).ok_or_else(|| period_error(budget))?;
        }

        let next = successor(budget, start, end, &budget.created_by_id);
        if let Some(existing) = self
            .store
            .find_budget_by_name_and_start(&budget.tenant_id, &next.name, next.start_date)?
        {
            debug!(
                tenant_id = %budget.tenant_id,
                budget_id = %budget.id,
                successor_id = %existing.id,
                "successor already exists, deactivating source only"
            );
            self.store.deactivate_budget(&budget.tenant_id, &budget.id)?;
            return Ok(false);
        }

        let renewed = self.store.supersede_budget(&budget.tenant_id, &budget.id, &next)?;
        info!(
            tenant_id = %budget.tenant_id,
            budget_id = %budget.id,
            successor_id = %renewed.id,
            start = %renewed.start_date,
            end = %renewed.end_date,
            "budget auto-renewed"
        );
        Ok(true)
    }
}
