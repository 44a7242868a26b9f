//! `agency-jobs`: the scheduled batch jobs and request-path hooks of the
//! agency back office.
//!
//! | Job                   | Module        | Entry point                                  |
//! |-----------------------|---------------|----------------------------------------------|
//! | `renewal_tasks`       | [`renewals`]  | `generate_renewal_tasks_for_all_tenants`     |
//! | `recurring_expenses`  | [`expenses`]  | `create_recurring_expenses_for_all_tenants`  |
//! | `budget_auto_renewal` | [`budgets`]   | `auto_renew_budgets_for_all_tenants`         |
//! | `daily_digest`        | [`digest`]    | `send_daily_digest_for_all_tenants`          |
//!
//! [`alerts`] is not cron-driven; the expense approval path calls
//! `BudgetAlerts::on_expense_approved`. Policy updates call
//! `RenewalTasks::handle_policy_change`.

pub mod alerts;
pub mod budgets;
pub mod digest;
pub mod expenses;
pub mod handlers;
pub mod renewals;

pub use alerts::BudgetAlerts;
pub use budgets::BudgetRenewals;
pub use digest::{DigestCompiler, DigestData};
pub use expenses::RecurringExpenses;
pub use handlers::register_jobs;
pub use renewals::RenewalTasks;
