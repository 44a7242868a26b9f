// Store-level guarantees the scheduling jobs lean on.

use agency_core::store::*;
use agency_core::types::*;
use agency_store::SqliteStore;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn seeded() -> (SqliteStore, TenantId, UserId) {
    let store = SqliteStore::open_in_memory().unwrap();
    let tenant = Tenant {
        id: TenantId::from("t1"),
        name: "Maple Insurance".into(),
    };
    store.insert_tenant(&tenant).unwrap();
    let user = User {
        id: UserId::from("u1"),
        tenant_id: tenant.id.clone(),
        email: "owner@maple.test".into(),
        name: "Owner".into(),
        role: UserRole::Admin,
        digest_opt_out: false,
        email_renewal_reminders: true,
        notify_budget_alerts: true,
    };
    store.insert_user(&user).unwrap();
    (store, tenant.id, user.id)
}

fn renewal_task(tenant: &TenantId, policy: &PolicyId, days: u32) -> NewRenewalTask {
    NewRenewalTask {
        tenant_id: tenant.clone(),
        policy_id: policy.clone(),
        client_id: ClientId::from("c1"),
        renewal_days_before: days,
        priority: TaskPriority::High,
        due_date: date(2024, 5, 1),
        title: "Policy renewal in 30 days".into(),
        description: "Renew".into(),
        created_by_id: UserId::from("u1"),
    }
}

#[test]
fn second_open_renewal_task_is_rejected_by_index() {
    let (store, tenant, _) = seeded();
    let policy = PolicyId::from("p1");

    let first = store.create_renewal_task(&renewal_task(&tenant, &policy, 30)).unwrap();
    assert!(first.is_some());
    let second = store.create_renewal_task(&renewal_task(&tenant, &policy, 30)).unwrap();
    assert!(second.is_none());

    // A different milestone for the same policy is independent.
    assert!(store
        .create_renewal_task(&renewal_task(&tenant, &policy, 7))
        .unwrap()
        .is_some());
}

#[test]
fn done_task_frees_the_milestone_slot() {
    let (store, tenant, _) = seeded();
    let policy = PolicyId::from("p1");
    let task = store
        .create_renewal_task(&renewal_task(&tenant, &policy, 60))
        .unwrap()
        .unwrap();
    store.update_task_status(&tenant, &task.id, TaskStatus::Done).unwrap();

    assert!(store.find_open_renewal_task(&tenant, &policy, 60).unwrap().is_none());
    assert!(store
        .create_renewal_task(&renewal_task(&tenant, &policy, 60))
        .unwrap()
        .is_some());

    // Deleting open tasks leaves the done one in place.
    assert_eq!(store.delete_open_renewal_tasks(&tenant, &policy).unwrap(), 1);
    let remaining = store.list_tasks_for_policy(&tenant, &policy).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].status, TaskStatus::Done);
}

#[test]
fn update_status_of_unknown_task_is_not_found() {
    let (store, tenant, _) = seeded();
    let err = store
        .update_task_status(&tenant, &TaskId::from("missing"), TaskStatus::Done)
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn supersede_is_atomic_and_tenant_scoped() {
    let (store, tenant, user) = seeded();
    let budget = store
        .create_budget(&NewBudget {
            tenant_id: tenant.clone(),
            name: "Marketing".into(),
            total_limit: Decimal::new(500000, 2),
            start_date: date(2024, 1, 1),
            end_date: date(2024, 1, 31),
            created_by_id: user.clone(),
            categories: vec![BudgetCategory {
                category: "ads".into(),
                limit_amount: Decimal::new(200000, 2),
            }],
        })
        .unwrap();

    let successor = NewBudget {
        tenant_id: tenant.clone(),
        name: "Marketing (Renewed)".into(),
        total_limit: budget.total_limit,
        start_date: date(2024, 2, 1),
        end_date: date(2024, 2, 29),
        created_by_id: user,
        categories: budget.categories.clone(),
    };

    let other_tenant = TenantId::from("t2");
    assert!(store.supersede_budget(&other_tenant, &budget.id, &successor).is_err());
    assert_eq!(store.list_budgets(&tenant).unwrap().len(), 1);

    let renewed = store.supersede_budget(&tenant, &budget.id, &successor).unwrap();
    let source = store.get_budget(&tenant, &budget.id).unwrap().unwrap();
    assert!(!source.is_active);
    let stored = store.get_budget(&tenant, &renewed.id).unwrap().unwrap();
    assert!(stored.is_active);
    assert_eq!(stored.total_limit, Decimal::new(500000, 2));
    assert_eq!(stored.categories, budget.categories);
}

#[test]
fn cursor_check_rejects_stale_spawn() {
    let (store, tenant, user) = seeded();
    let parent = store
        .create_expense(&NewExpense {
            tenant_id: tenant.clone(),
            amount: Decimal::new(9900, 2),
            category: "software".into(),
            description: None,
            date: date(2024, 1, 15),
            status: ExpenseStatus::Approved,
            is_recurring: true,
            recurrence: Some(Recurrence::Monthly),
            budget_id: None,
            parent_expense_id: None,
            next_occurrence: Some(date(2024, 1, 15)),
            created_by_id: user.clone(),
        })
        .unwrap();

    let child = NewExpense {
        tenant_id: tenant.clone(),
        amount: parent.amount,
        category: parent.category.clone(),
        description: None,
        date: date(2024, 1, 15),
        status: ExpenseStatus::Draft,
        is_recurring: false,
        recurrence: None,
        budget_id: None,
        parent_expense_id: Some(parent.id.clone()),
        next_occurrence: None,
        created_by_id: user,
    };

    let first = store
        .spawn_recurring_children(&parent, date(2024, 1, 15), &[child.clone()], date(2024, 2, 15))
        .unwrap();
    assert_eq!(first.unwrap().len(), 1);

    // A run that read the old cursor loses and writes nothing.
    let stale = store
        .spawn_recurring_children(&parent, date(2024, 1, 15), &[child], date(2024, 2, 15))
        .unwrap();
    assert!(stale.is_none());
    assert_eq!(store.list_child_expenses(&tenant, &parent.id).unwrap().len(), 1);
    let reloaded = store.get_expense(&tenant, &parent.id).unwrap().unwrap();
    assert_eq!(reloaded.next_occurrence, Some(date(2024, 2, 15)));
}

#[test]
fn approved_total_ignores_other_statuses() {
    let (store, tenant, user) = seeded();
    let budget_id = BudgetId::from("b1");
    for (cents, status) in [
        (10000, ExpenseStatus::Approved),
        (2550, ExpenseStatus::Approved),
        (99999, ExpenseStatus::Draft),
        (99999, ExpenseStatus::Rejected),
    ] {
        store
            .create_expense(&NewExpense {
                tenant_id: tenant.clone(),
                amount: Decimal::new(cents, 2),
                category: "office".into(),
                description: None,
                date: date(2024, 1, 3),
                status,
                is_recurring: false,
                recurrence: None,
                budget_id: Some(budget_id.clone()),
                parent_expense_id: None,
                next_occurrence: None,
                created_by_id: user.clone(),
            })
            .unwrap();
    }
    assert_eq!(
        store.approved_total_for_budget(&tenant, &budget_id).unwrap(),
        Decimal::new(12550, 2)
    );
}

#[test]
fn approved_total_overflow_is_reported() {
    let (store, tenant, user) = seeded();
    let budget_id = BudgetId::from("b1");
    for _ in 0..2 {
        store
            .create_expense(&NewExpense {
                tenant_id: tenant.clone(),
                amount: Decimal::MAX,
                category: "office".into(),
                description: None,
                date: date(2024, 1, 3),
                status: ExpenseStatus::Approved,
                is_recurring: false,
                recurrence: None,
                budget_id: Some(budget_id.clone()),
                parent_expense_id: None,
                next_occurrence: None,
                created_by_id: user.clone(),
            })
            .unwrap();
    }
    let err = store.approved_total_for_budget(&tenant, &budget_id).unwrap_err();
    assert_eq!(err.code(), "INTERNAL_ERROR");
}

#[test]
fn alert_lookup_uses_metadata_key() {
    let (store, tenant, user) = seeded();
    store
        .create_alert(
            &tenant,
            &user,
            &NewAlert {
                alert_type: AlertType::BudgetWarning,
                title: "Budget warning".into(),
                message: "80%".into(),
                metadata: json!({"budgetId": "b1", "percentage": 80}),
            },
        )
        .unwrap();

    let b1 = AlertKey::budget_warning(&BudgetId::from("b1"));
    let b2 = AlertKey::budget_warning(&BudgetId::from("b2"));
    assert!(store.has_existing_alert(&tenant, AlertType::BudgetWarning, &b1).unwrap());
    assert!(!store.has_existing_alert(&tenant, AlertType::BudgetWarning, &b2).unwrap());
    assert!(!store.has_existing_alert(&tenant, AlertType::System, &b1).unwrap());
    assert!(!store
        .has_existing_alert(&TenantId::from("t2"), AlertType::BudgetWarning, &b1)
        .unwrap());
}
