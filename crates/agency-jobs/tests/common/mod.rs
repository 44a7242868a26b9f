#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use agency_core::types::*;
use agency_core::store::*;
use agency_mail::{EmailMessage, MailError, Mailer, SendReceipt};
use agency_store::SqliteStore;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// In-memory store plus typed handles to what the fixtures inserted.
pub struct Fixture {
    pub store: Arc<SqliteStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(SqliteStore::open_in_memory().unwrap()),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn tenant(&self, id: &str) -> TenantId {
        self.store
            .insert_tenant(&Tenant {
                id: TenantId::from(id),
                name: format!("Agency {id}"),
            })
            .unwrap();
        TenantId::from(id)
    }

    pub fn user(&self, tenant: &TenantId, id: &str, role: UserRole) -> User {
        self.user_with(tenant, id, role, |_| {})
    }

    /// Insert a user after letting `tweak` adjust the defaults.
    pub fn user_with(&self, tenant: &TenantId, id: &str, role: UserRole, tweak: impl FnOnce(&mut User)) -> User {
        let mut user = User {
            id: UserId::from(id),
            tenant_id: tenant.clone(),
            email: format!("{id}@agency.test"),
            name: id.to_string(),
            role,
            digest_opt_out: false,
            email_renewal_reminders: true,
            notify_budget_alerts: true,
        };
        tweak(&mut user);
        self.store.insert_user(&user).unwrap();
        user
    }

    pub fn client(&self, tenant: &TenantId, id: &str, name: &str) -> ClientId {
        self.store
            .insert_client(&Client {
                id: ClientId::from(id),
                tenant_id: tenant.clone(),
                name: name.into(),
            })
            .unwrap();
        ClientId::from(id)
    }

    pub fn policy(
        &self,
        tenant: &TenantId,
        client: &ClientId,
        id: &str,
        end_date: Option<NaiveDate>,
        status: PolicyStatus,
        owner: &UserId,
    ) -> Policy {
        let policy = Policy {
            id: PolicyId::from(id),
            tenant_id: tenant.clone(),
            client_id: client.clone(),
            policy_type: "auto".into(),
            end_date,
            status,
            created_by_id: owner.clone(),
        };
        self.store.insert_policy(&policy).unwrap();
        policy
    }

    pub fn renewable(&self, policy: &Policy) -> RenewablePolicy {
        self.store
            .get_policy(&policy.tenant_id, &policy.id)
            .unwrap()
            .unwrap()
    }

    pub fn budget(
        &self,
        tenant: &TenantId,
        owner: &UserId,
        name: &str,
        limit: Decimal,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Budget {
        self.store
            .create_budget(&NewBudget {
                tenant_id: tenant.clone(),
                name: name.into(),
                total_limit: limit,
                start_date: start,
                end_date: end,
                created_by_id: owner.clone(),
                categories: vec![BudgetCategory {
                    category: "marketing".into(),
                    limit_amount: limit,
                }],
            })
            .unwrap()
    }

    pub fn expense(
        &self,
        tenant: &TenantId,
        owner: &UserId,
        amount: Decimal,
        status: ExpenseStatus,
        budget: Option<&BudgetId>,
    ) -> Expense {
        self.store
            .create_expense(&NewExpense {
                tenant_id: tenant.clone(),
                amount,
                category: "marketing".into(),
                description: None,
                date: date(2024, 1, 10),
                status,
                is_recurring: false,
                recurrence: None,
                budget_id: budget.cloned(),
                parent_expense_id: None,
                next_occurrence: None,
                created_by_id: owner.clone(),
            })
            .unwrap()
    }

    pub fn recurring(
        &self,
        tenant: &TenantId,
        owner: &UserId,
        recurrence: Recurrence,
        next: NaiveDate,
    ) -> Expense {
        self.store
            .create_expense(&NewExpense {
                tenant_id: tenant.clone(),
                amount: Decimal::new(4999, 2),
                category: "software".into(),
                description: Some("CRM seat".into()),
                date: next,
                status: ExpenseStatus::Approved,
                is_recurring: true,
                recurrence: Some(recurrence),
                budget_id: None,
                parent_expense_id: None,
                next_occurrence: Some(next),
                created_by_id: owner.clone(),
            })
            .unwrap()
    }

    /// A plain (non-renewal) task.
    pub fn task(
        &self,
        tenant: &TenantId,
        id: &str,
        due: NaiveDate,
        status: TaskStatus,
        created_by: &UserId,
        assigned_to: Option<&UserId>,
    ) -> Task {
        let task = Task {
            id: TaskId::from(id),
            tenant_id: tenant.clone(),
            task_type: TaskType::FollowUp,
            status,
            priority: TaskPriority::Medium,
            title: format!("Follow up {id}"),
            description: None,
            due_date: Some(due),
            policy_id: None,
            client_id: None,
            renewal_days_before: None,
            assigned_to_id: assigned_to.cloned(),
            created_by_id: created_by.clone(),
            created_at: Utc::now(),
        };
        self.store.insert_task(&task).unwrap();
        task
    }
}

/// Mailer double that records every message, optionally failing for some recipients.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail_for: Vec<String>,
}

impl RecordingMailer {
    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_for: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailError> {
        if self.fail_for.contains(&message.to) {
            return Err(MailError::Api {
                status: 500,
                message: "upstream unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(SendReceipt {
            id: Some(format!("msg-{}", message.to)),
        })
    }
}
