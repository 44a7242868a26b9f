mod common;

use agency_core::types::*;
use agency_jobs::RecurringExpenses;
use common::*;

#[test]
fn on_time_monthly_run_spawns_one_child() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let owner = fx.user(&tenant, "owner", UserRole::Admin).id;
    let parent = fx.recurring(&tenant, &owner, Recurrence::Monthly, date(2024, 1, 15));

    let expenses = RecurringExpenses::new(fx.dyn_store(), 366);
    let report = expenses
        .create_recurring_expenses_for_all_tenants(date(2024, 1, 16))
        .unwrap();
    assert_eq!((report.examined, report.changed, report.failed), (1, 1, 0));

    let children = fx.store.list_child_expenses(&tenant, &parent.id).unwrap();
    assert_eq!(children.len(), 1);
    let child = &children[0];
    assert_eq!(child.date, date(2024, 1, 15));
    assert_eq!(child.status, ExpenseStatus::Draft);
    assert!(!child.is_recurring);
    assert_eq!(child.recurrence, None);
    assert_eq!(child.amount, parent.amount);
    assert_eq!(child.category, parent.category);
    assert_eq!(child.budget_id, parent.budget_id);
    assert_eq!(child.parent_expense_id.as_ref(), Some(&parent.id));

    let parent = fx.store.get_expense(&tenant, &parent.id).unwrap().unwrap();
    assert_eq!(parent.next_occurrence, Some(date(2024, 2, 15)));

    // Re-running the same day changes nothing.
    let again = expenses
        .create_recurring_expenses_for_all_tenants(date(2024, 1, 16))
        .unwrap();
    assert_eq!(again.examined, 0);
    assert_eq!(fx.store.list_child_expenses(&tenant, &parent.id).unwrap().len(), 1);
}

#[test]
fn delayed_run_creates_one_child_per_missed_interval() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let owner = fx.user(&tenant, "owner", UserRole::Admin).id;
    let parent = fx.recurring(&tenant, &owner, Recurrence::Weekly, date(2024, 1, 1));

    let expenses = RecurringExpenses::new(fx.dyn_store(), 366);
    let report = expenses
        .create_recurring_expenses_for_all_tenants(date(2024, 1, 20))
        .unwrap();
    assert_eq!(report.changed, 3);

    let dates: Vec<_> = fx
        .store
        .list_child_expenses(&tenant, &parent.id)
        .unwrap()
        .into_iter()
        .map(|e| e.date)
        .collect();
    assert_eq!(dates, vec![date(2024, 1, 1), date(2024, 1, 8), date(2024, 1, 15)]);
    let parent = fx.store.get_expense(&tenant, &parent.id).unwrap().unwrap();
    assert_eq!(parent.next_occurrence, Some(date(2024, 1, 22)));
}

#[test]
fn catch_up_cap_defers_the_rest() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let owner = fx.user(&tenant, "owner", UserRole::Admin).id;
    let parent = fx.recurring(&tenant, &owner, Recurrence::Weekly, date(2024, 1, 1));

    let expenses = RecurringExpenses::new(fx.dyn_store(), 2);
    let today = date(2024, 1, 20);
    expenses.create_recurring_expenses_for_all_tenants(today).unwrap();
    assert_eq!(fx.store.list_child_expenses(&tenant, &parent.id).unwrap().len(), 2);

    expenses.create_recurring_expenses_for_all_tenants(today).unwrap();
    assert_eq!(fx.store.list_child_expenses(&tenant, &parent.id).unwrap().len(), 3);
    let parent = fx.store.get_expense(&tenant, &parent.id).unwrap().unwrap();
    assert_eq!(parent.next_occurrence, Some(date(2024, 1, 22)));
}

#[test]
fn yearly_and_future_cursors() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let owner = fx.user(&tenant, "owner", UserRole::Admin).id;
    let yearly = fx.recurring(&tenant, &owner, Recurrence::Yearly, date(2024, 2, 29));
    let future = fx.recurring(&tenant, &owner, Recurrence::Monthly, date(2024, 4, 1));

    let expenses = RecurringExpenses::new(fx.dyn_store(), 366);
    let report = expenses
        .create_recurring_expenses_for_all_tenants(date(2024, 3, 1))
        .unwrap();
    assert_eq!(report.examined, 1);

    let yearly = fx.store.get_expense(&tenant, &yearly.id).unwrap().unwrap();
    assert_eq!(yearly.next_occurrence, Some(date(2025, 2, 28)));
    assert!(fx.store.list_child_expenses(&tenant, &future.id).unwrap().is_empty());
}

#[test]
fn broken_parent_does_not_stop_the_batch() {
    let fx = Fixture::new();
    let tenant = fx.tenant("t1");
    let owner = fx.user(&tenant, "owner", UserRole::Admin).id;
    // Recurring flag and cursor but no recurrence: cannot be advanced.
    let broken = fx
        .store
        .create_expense(&NewExpense {
            tenant_id: tenant.clone(),
            amount: rust_decimal::Decimal::new(10, 0),
            category: "misc".into(),
            description: None,
            date: date(2024, 1, 1),
            status: ExpenseStatus::Approved,
            is_recurring: true,
            recurrence: None,
            budget_id: None,
            parent_expense_id: None,
            next_occurrence: Some(date(2024, 1, 1)),
            created_by_id: owner.clone(),
        })
        .unwrap();
    let healthy = fx.recurring(&tenant, &owner, Recurrence::Monthly, date(2024, 1, 10));

    let expenses = RecurringExpenses::new(fx.dyn_store(), 366);
    let report = expenses
        .create_recurring_expenses_for_all_tenants(date(2024, 1, 16))
        .unwrap();
    assert_eq!((report.examined, report.changed, report.failed), (2, 1, 1));
    assert!(fx.store.list_child_expenses(&tenant, &broken.id).unwrap().is_empty());
    assert_eq!(fx.store.list_child_expenses(&tenant, &healthy.id).unwrap().len(), 1);
}
