//! Scheduler adapters: one [`JobHandler`] per batch job, and registration of
//! the configured triggers.

use std::sync::Arc;

use agency_core::config::{AgencyConfig, TriggerConfig};
use agency_core::{AgencyError, Store};
use agency_mail::Mailer;
use agency_scheduler::{JobContext, JobHandler, JobReport, SchedulerEngine};
use async_trait::async_trait;
use chrono_tz::Tz;
use tracing::info;

use crate::budgets::BudgetRenewals;
use crate::digest::DigestCompiler;
use crate::expenses::RecurringExpenses;
use crate::renewals::RenewalTasks;

pub const RENEWAL_TASKS: &str = "renewal_tasks";
pub const RECURRING_EXPENSES: &str = "recurring_expenses";
pub const BUDGET_AUTO_RENEWAL: &str = "budget_auto_renewal";
pub const DAILY_DIGEST: &str = "daily_digest";

/// Run a synchronous store scan on tokio's blocking pool so it does not hold
/// a runtime worker. A panic in the scan is re-raised in the calling task.
pub(crate) async fn on_blocking_pool<F>(scan: F) -> agency_core::Result<JobReport>
where
    F: FnOnce() -> agency_core::Result<JobReport> + Send + 'static,
{
    match tokio::task::spawn_blocking(scan).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(AgencyError::Internal(format!("batch scan cancelled: {e}"))),
    }
}

pub struct RenewalTasksJob {
    pub renewals: RenewalTasks,
    pub tz: Tz,
}

#[async_trait]
impl JobHandler for RenewalTasksJob {
    async fn run(&self, ctx: &JobContext) -> agency_core::Result<JobReport> {
        let renewals = self.renewals.clone();
        let today = ctx.today(self.tz);
        on_blocking_pool(move || renewals.generate_renewal_tasks_for_all_tenants(today)).await
    }
}

pub struct RecurringExpensesJob {
    pub expenses: RecurringExpenses,
    pub tz: Tz,
}

#[async_trait]
impl JobHandler for RecurringExpensesJob {
    async fn run(&self, ctx: &JobContext) -> agency_core::Result<JobReport> {
        let expenses = self.expenses.clone();
        let today = ctx.today(self.tz);
        on_blocking_pool(move || expenses.create_recurring_expenses_for_all_tenants(today)).await
    }
}

pub struct BudgetAutoRenewalJob {
    pub budgets: BudgetRenewals,
    pub tz: Tz,
}

#[async_trait]
impl JobHandler for BudgetAutoRenewalJob {
    async fn run(&self, ctx: &JobContext) -> agency_core::Result<JobReport> {
        let budgets = self.budgets.clone();
        let today = ctx.today(self.tz);
        on_blocking_pool(move || budgets.auto_renew_budgets_for_all_tenants(today)).await
    }
}

pub struct DailyDigestJob {
    pub digest: DigestCompiler,
    pub tz: Tz,
}

#[async_trait]
impl JobHandler for DailyDigestJob {
    async fn run(&self, ctx: &JobContext) -> agency_core::Result<JobReport> {
        self.digest
            .send_daily_digest_for_all_tenants(ctx.today(self.tz))
            .await
    }
}

/// Register every enabled trigger from `config` on `engine`.
pub fn register_jobs(
    engine: &mut SchedulerEngine,
    config: &AgencyConfig,
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
) -> agency_core::Result<()> {
    let tz = config.timezone()?;
    let triggers: [(&str, &TriggerConfig, Arc<dyn JobHandler>); 4] = [
        (
            RENEWAL_TASKS,
            &config.scheduler.renewal_tasks,
            Arc::new(RenewalTasksJob {
                renewals: RenewalTasks::new(store.clone()),
                tz,
            }),
        ),
        (
            RECURRING_EXPENSES,
            &config.scheduler.recurring_expenses,
            Arc::new(RecurringExpensesJob {
                expenses: RecurringExpenses::new(store.clone(), config.expenses.max_catch_up),
                tz,
            }),
        ),
        (
            BUDGET_AUTO_RENEWAL,
            &config.scheduler.budget_auto_renewal,
            Arc::new(BudgetAutoRenewalJob {
                budgets: BudgetRenewals::new(store.clone()),
                tz,
            }),
        ),
        (
            DAILY_DIGEST,
            &config.scheduler.daily_digest,
            Arc::new(DailyDigestJob {
                digest: DigestCompiler::new(
                    store,
                    mailer,
                    config.renewals.digest_lookahead_days,
                    config.mail.app_url.clone(),
                ),
                tz,
            }),
        ),
    ];

    for (name, trigger, handler) in triggers {
        if !trigger.enabled {
            info!(job = name, "trigger disabled by config");
            continue;
        }
        engine.register_cron(name, &trigger.cron, tz, handler)?;
    }
    Ok(())
}
