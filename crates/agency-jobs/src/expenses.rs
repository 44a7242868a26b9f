//! Recurring expense generation.

use std::sync::Arc;

use agency_core::types::{Expense, ExpenseStatus, NewExpense, Recurrence};
use agency_core::{AgencyError, Result, Store};
use agency_scheduler::JobReport;
use chrono::{Days, Months, NaiveDate};
use tracing::{debug, info, warn};

/// Move a recurrence cursor forward by one interval. Month and year steps
/// clamp to the last day of a shorter month (Jan 31 → Feb 29).
pub fn advance(date: NaiveDate, recurrence: Recurrence) -> Option<NaiveDate> {
    match recurrence {
        Recurrence::Weekly => date.checked_add_days(Days::new(7)),
        Recurrence::Monthly => date.checked_add_months(Months::new(1)),
        Recurrence::Yearly => date.checked_add_months(Months::new(12)),
    }
}

/// Occurrences due on or before `today`, starting at `cursor`, at most `cap`
/// of them, and the cursor value that follows the last one.
pub fn due_occurrences(
    cursor: NaiveDate,
    recurrence: Recurrence,
    today: NaiveDate,
    cap: u32,
) -> Option<(Vec<NaiveDate>, NaiveDate)> {
    let mut dates = Vec::new();
    let mut next = cursor;
    while next <= today && dates.len() < cap as usize {
        dates.push(next);
        next = advance(next, recurrence)?;
    }
    Some((dates, next))
}

fn child_of(parent: &Expense, date: NaiveDate) -> NewExpense {
    NewExpense {
        tenant_id: parent.tenant_id.clone(),
        amount: parent.amount,
        category: parent.category.clone(),
        description: parent.description.clone(),
        date,
        status: ExpenseStatus::Draft,
        is_recurring: false,
        recurrence: None,
        budget_id: parent.budget_id.clone(),
        parent_expense_id: Some(parent.id.clone()),
        next_occurrence: None,
        created_by_id: parent.created_by_id.clone(),
    }
}

#[derive(Clone)]
pub struct RecurringExpenses {
    store: Arc<dyn Store>,
    max_catch_up: u32,
}

impl RecurringExpenses {
    /// `max_catch_up` bounds how many children one parent may spawn in a
    /// single run; the remainder is picked up by the next run.
    pub fn new(store: Arc<dyn Store>, max_catch_up: u32) -> Self {
        Self {
            store,
            max_catch_up: max_catch_up.max(1),
        }
    }

    /// Spawn one draft child per elapsed occurrence of every due recurring
    /// expense and move each cursor past `today`.
    pub fn create_recurring_expenses_for_all_tenants(&self, today: NaiveDate) -> Result<JobReport> {
        let mut report = JobReport::default();
        for parent in self.store.list_due_recurring_expenses(today)? {
            report.examined += 1;
            match self.spawn_due_children(&parent, today) {
                Ok(n) => report.changed += n,
                Err(e) => {
                    warn!(
                        tenant_id = %parent.tenant_id,
                        expense_id = %parent.id,
                        "recurring expense generation failed: {e}"
                    );
                    report.failed += 1;
                }
            }
        }
        info!(%report, "recurring expense generation finished");
        Ok(report)
    }

    /// Returns the number of children created for `parent`.
    pub fn spawn_due_children(&self, parent: &Expense, today: NaiveDate) -> Result<u32> {
        let (Some(recurrence), Some(cursor)) = (parent.recurrence, parent.next_occurrence) else {
            return Err(AgencyError::Internal(format!(
                "recurring expense {} has no recurrence or cursor",
                parent.id
            )));
        };

        let (dates, next) = due_occurrences(cursor, recurrence, today, self.max_catch_up)
            .ok_or_else(|| AgencyError::Internal(format!("recurrence cursor overflow for {}", parent.id)))?;
        if dates.is_empty() {
            return Ok(0);
        }
        if next <= today {
            warn!(
                expense_id = %parent.id,
                spawned = dates.len(),
                %next,
                "catch-up limit reached, remaining occurrences deferred"
            );
        }

        let children: Vec<NewExpense> = dates.iter().map(|date| child_of(parent, *date)).collect();
        match self.store.spawn_recurring_children(parent, cursor, &children, next)? {
            Some(created) => {
                debug!(
                    tenant_id = %parent.tenant_id,
                    expense_id = %parent.id,
                    created = created.len(),
                    %next,
                    "recurring expense advanced"
                );
                Ok(created.len() as u32)
            }
            None => {
                debug!(expense_id = %parent.id, "cursor moved by a concurrent run, skipping");
                Ok(0)
            }
        }
    }
}
