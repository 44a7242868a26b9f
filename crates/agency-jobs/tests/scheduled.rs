// Jobs driven through the scheduler the way the worker wires them.

mod common;

use std::sync::Arc;

use agency_core::config::AgencyConfig;
use agency_core::types::*;
use agency_core::FixedClock;
use agency_jobs::handlers::{BUDGET_AUTO_RENEWAL, DAILY_DIGEST, RECURRING_EXPENSES, RENEWAL_TASKS};
use agency_jobs::register_jobs;
use agency_scheduler::{JobLedger, RunStatus, SchedulerEngine};
use chrono::{TimeZone, Utc};
use common::*;

fn engine_at(fx: &Fixture, config: &AgencyConfig, clock: Arc<FixedClock>, mailer: Arc<RecordingMailer>) -> SchedulerEngine {
    let mut engine = SchedulerEngine::new(JobLedger::open_in_memory().unwrap(), clock);
    register_jobs(&mut engine, config, fx.dyn_store(), mailer).unwrap();
    engine
}

#[tokio::test]
async fn tenant_with_three_policies_end_to_end() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let other = fx.tenant("t2");
    let owner = fx.user(&tenant, "owner", UserRole::Admin).id;
    fx.user(&other, "someone", UserRole::Admin);
    let client = fx.client(&tenant, "c1", "Contoso");

    let lapsed = fx.policy(&tenant, &client, "p-lapsed", Some(date(2023, 12, 1)), PolicyStatus::Expired, &owner);
    let spring = fx.policy(&tenant, &client, "p-spring", Some(date(2024, 4, 30)), PolicyStatus::Active, &owner);
    let summer = fx.policy(&tenant, &client, "p-summer", Some(date(2024, 7, 31)), PolicyStatus::PendingRenewal, &owner);

    // 2024-01-15 06:00 UTC is 01:00 in Toronto, the renewal trigger's slot.
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap()));
    let engine = engine_at(&fx, &AgencyConfig::default(), clock, Arc::new(RecordingMailer::default()));

    let outcome = engine.run_now(RENEWAL_TASKS).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    let report = outcome.report.unwrap();
    assert_eq!((report.examined, report.changed, report.failed), (2, 6, 0));

    assert!(fx.store.list_tasks_for_policy(&tenant, &lapsed.id).unwrap().is_empty());
    assert_eq!(fx.store.list_tasks_for_policy(&tenant, &spring.id).unwrap().len(), 3);
    assert_eq!(fx.store.list_tasks_for_policy(&tenant, &summer.id).unwrap().len(), 3);
    assert!(fx.store.list_tasks(&other).unwrap().is_empty());

    // The next firing is the retry, and it is a no-op.
    let again = engine.run_now(RENEWAL_TASKS).await.unwrap();
    assert_eq!(again.report.unwrap().changed, 0);
    assert_eq!(fx.store.list_tasks(&tenant).unwrap().len(), 6);
}

#[tokio::test]
async fn today_comes_from_the_business_timezone() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let owner = fx.user(&tenant, "owner", UserRole::Admin).id;
    let parent = fx.recurring(&tenant, &owner, Recurrence::Monthly, date(2024, 1, 16));

    // 03:00 UTC on Jan 16 is still Jan 15 in Toronto: not due yet.
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 16, 3, 0, 0).unwrap()));
    let engine = engine_at(&fx, &AgencyConfig::default(), clock.clone(), Arc::new(RecordingMailer::default()));
    let outcome = engine.run_now(RECURRING_EXPENSES).await.unwrap();
    assert_eq!(outcome.report.unwrap().examined, 0);

    clock.advance(chrono::Duration::hours(4));
    let outcome = engine.run_now(RECURRING_EXPENSES).await.unwrap();
    assert_eq!(outcome.report.unwrap().changed, 1);
    assert_eq!(fx.store.list_child_expenses(&tenant, &parent.id).unwrap().len(), 1);
}

#[tokio::test]
async fn digest_and_budget_jobs_run_through_the_engine() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let owner = fx.user(&tenant, "owner", UserRole::Admin).id;
    fx.task(&tenant, "k1", date(2024, 1, 20), TaskStatus::Todo, &owner, None);
    fx.budget(&tenant, &owner, "Marketing", rust_decimal::Decimal::new(500, 0), date(2024, 1, 1), date(2024, 1, 31));

    // Feb 1, 13:00 UTC = 08:00 EST.
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 2, 1, 13, 0, 0).unwrap()));
    let mailer = Arc::new(RecordingMailer::default());
    let engine = engine_at(&fx, &AgencyConfig::default(), clock, mailer.clone());

    let digest = engine.run_now(DAILY_DIGEST).await.unwrap();
    assert_eq!(digest.status, RunStatus::Completed);
    assert_eq!(mailer.sent().len(), 1);

    let budgets = engine.run_now(BUDGET_AUTO_RENEWAL).await.unwrap();
    assert_eq!(budgets.report.unwrap().changed, 1);
    assert!(fx
        .store
        .list_budgets(&tenant)
        .unwrap()
        .iter()
        .any(|b| b.name == "Marketing (Renewed)" && b.is_active));

    let history = engine.ledger().list_runs(DAILY_DIGEST, 5).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn default_triggers_and_disabled_jobs() {
    let fx = Fixture::new();
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()));

    let engine = engine_at(&fx, &AgencyConfig::default(), clock.clone(), Arc::new(RecordingMailer::default()));
    let triggers = engine.list();
    let names: Vec<_> = triggers.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec![BUDGET_AUTO_RENEWAL, DAILY_DIGEST, RECURRING_EXPENSES, RENEWAL_TASKS]);
    let budget = triggers.iter().find(|t| t.name == BUDGET_AUTO_RENEWAL).unwrap();
    // Midnight Feb 1 in Toronto.
    assert_eq!(budget.next_fire, Some(Utc.with_ymd_and_hms(2024, 2, 1, 5, 0, 0).unwrap()));

    let mut config = AgencyConfig::default();
    config.scheduler.daily_digest.enabled = false;
    let engine = engine_at(&fx, &config, clock, Arc::new(RecordingMailer::default()));
    assert!(!engine.job_names().iter().any(|n| n == DAILY_DIGEST));
    assert!(engine.run_now(DAILY_DIGEST).await.is_err());
}
