mod common;

use std::sync::Arc;

use agency_core::types::*;
use agency_jobs::{DigestCompiler, RenewalTasks};
use common::*;

fn compiler(fx: &Fixture, mailer: Arc<RecordingMailer>) -> DigestCompiler {
    DigestCompiler::new(fx.dyn_store(), mailer, 61, "https://app.agency.test/")
}

#[tokio::test]
async fn empty_digest_is_not_sent() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let user = fx.user(&tenant, "ana", UserRole::Agent);
    // Done and future tasks are not reportable.
    fx.task(&tenant, "k1", date(2024, 1, 1), TaskStatus::Done, &user.id, None);
    fx.task(&tenant, "k2", date(2024, 2, 1), TaskStatus::Todo, &user.id, None);

    let mailer = Arc::new(RecordingMailer::default());
    let report = compiler(&fx, mailer.clone())
        .send_daily_digest_for_all_tenants(date(2024, 1, 15))
        .await
        .unwrap();
    assert_eq!((report.examined, report.changed, report.failed), (1, 0, 0));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn renewal_reminders_opt_out_keeps_overdue_tasks() {
    let fx = Fixture::new();
    let today = date(2024, 1, 15);
    let tenant = fx.tenant("t1");
    let user = fx.user_with(&tenant, "ben", UserRole::Agent, |u| u.email_renewal_reminders = false);

    let client = fx.client(&tenant, "c1", "Initech");
    let policy = fx.policy(&tenant, &client, "p1", Some(date(2024, 3, 1)), PolicyStatus::Active, &user.id);
    RenewalTasks::new(fx.dyn_store())
        .generate_tasks_for_policy(&fx.renewable(&policy), today)
        .unwrap();
    fx.task(&tenant, "late", date(2024, 1, 10), TaskStatus::InProgress, &user.id, None);

    let mailer = Arc::new(RecordingMailer::default());
    compiler(&fx, mailer.clone())
        .send_daily_digest_for_all_tenants(today)
        .await
        .unwrap();

    let sent: Vec<_> = mailer
        .sent()
        .into_iter()
        .filter(|m| m.to == "ben@agency.test")
        .collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Daily digest: 1 overdue task");
    assert!(sent[0].text.contains("Follow up late"));
    assert!(!sent[0].text.contains("Policy renewal"));
}

#[tokio::test]
async fn milestones_in_window_are_listed_for_their_owner() {
    let fx = Fixture::new();
    let today = date(2024, 1, 1);
    let tenant = fx.tenant("t1");
    let owner = fx.user(&tenant, "owner", UserRole::Admin);
    let other = fx.user(&tenant, "other", UserRole::Agent);
    let client = fx.client(&tenant, "c1", "Umbrella");
    // 60-day milestone due Mar 2: 61 days after Jan 1, the edge of the window.
    let policy = fx.policy(&tenant, &client, "p1", Some(date(2024, 5, 1)), PolicyStatus::Active, &owner.id);
    RenewalTasks::new(fx.dyn_store())
        .generate_tasks_for_policy(&fx.renewable(&policy), today)
        .unwrap();

    let mailer = Arc::new(RecordingMailer::default());
    let compiled = compiler(&fx, mailer.clone())
        .compile_for_tenant(&Tenant { id: tenant.clone(), name: "t1".into() }, today)
        .unwrap();
    let mine = compiled.iter().find(|d| d.user.id == owner.id).unwrap();
    assert_eq!(mine.milestones.len(), 1);
    assert_eq!(mine.milestones[0].due_date, Some(date(2024, 3, 2)));
    assert!(mine.overdue.is_empty());
    let theirs = compiled.iter().find(|d| d.user.id == other.id).unwrap();
    assert!(theirs.is_empty());

    compiler(&fx, mailer.clone())
        .send_daily_digest_for_all_tenants(today)
        .await
        .unwrap();
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "owner@agency.test");
    assert_eq!(sent[0].subject, "Daily digest: 1 upcoming renewal");
    assert!(sent[0].html.contains("https://app.agency.test/tasks/"));
}

#[tokio::test]
async fn assigned_tasks_go_to_the_assignee_and_opt_outs_get_nothing() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let creator = fx.user(&tenant, "creator", UserRole::Admin);
    let assignee = fx.user(&tenant, "assignee", UserRole::Agent);
    let muted = fx.user_with(&tenant, "muted", UserRole::Agent, |u| u.digest_opt_out = true);

    fx.task(&tenant, "k1", date(2024, 1, 2), TaskStatus::Todo, &creator.id, Some(&assignee.id));
    fx.task(&tenant, "k2", date(2024, 1, 3), TaskStatus::Waiting, &muted.id, None);

    let mailer = Arc::new(RecordingMailer::default());
    let report = compiler(&fx, mailer.clone())
        .send_daily_digest_for_all_tenants(date(2024, 1, 15))
        .await
        .unwrap();
    assert_eq!(report.examined, 2);
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "assignee@agency.test");
}

#[tokio::test]
async fn one_failed_send_does_not_block_others() {
    let fx = Fixture::new();
    let today = date(2024, 1, 15);
    let t1 = fx.tenant("t1");
    let t2 = fx.tenant("t2");
    let a = fx.user(&t1, "a", UserRole::Agent);
    let b = fx.user(&t1, "b", UserRole::Agent);
    let c = fx.user(&t2, "c", UserRole::Agent);
    for (tenant, user, id) in [(&t1, &a, "ka"), (&t1, &b, "kb"), (&t2, &c, "kc")] {
        fx.task(tenant, id, date(2024, 1, 1), TaskStatus::Todo, &user.id, None);
    }

    let mailer = Arc::new(RecordingMailer::failing_for(&["a@agency.test"]));
    let report = compiler(&fx, mailer.clone())
        .send_daily_digest_for_all_tenants(today)
        .await
        .unwrap();
    assert_eq!((report.examined, report.changed, report.failed), (3, 2, 1));
    let mut to: Vec<_> = mailer.sent().into_iter().map(|m| m.to).collect();
    to.sort();
    assert_eq!(to, vec!["b@agency.test", "c@agency.test"]);
}
