use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a string-backed identifier newtype.
///
/// New ids are UUIDv7 so rows sort by creation time and are easy to follow in logs.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Agency (tenant) identifier. Every store call is scoped by one.
    TenantId
);
string_id!(UserId);
string_id!(ClientId);
string_id!(PolicyId);
string_id!(TaskId);
string_id!(BudgetId);
string_id!(ExpenseId);
string_id!(AlertId);

/// Implements `Display` + `FromStr` over the snake_case wire names of a fieldless enum.
macro_rules! wire_enum {
    ($name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(concat!("unknown ", $label, ": {}"), other)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

/// Agency staff role. Only admins receive budget alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    #[default]
    Agent,
    Viewer,
}

wire_enum!(UserRole, "role" {
    Admin => "admin",
    Agent => "agent",
    Viewer => "viewer",
});

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// A staff member of a tenant, with the notification preferences the jobs honour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    /// Opted out of the daily digest entirely.
    pub digest_opt_out: bool,
    /// When false, renewal milestones are stripped from the digest.
    pub email_renewal_reminders: bool,
    /// Admins with this flag receive `budget_warning` alerts.
    pub notify_budget_alerts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub tenant_id: TenantId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Active,
    PendingRenewal,
    Renewed,
    Cancelled,
    Expired,
}

wire_enum!(PolicyStatus, "policy status" {
    Active => "active",
    PendingRenewal => "pending_renewal",
    Renewed => "renewed",
    Cancelled => "cancelled",
    Expired => "expired",
});

impl PolicyStatus {
    /// Statuses whose policies still get renewal reminders.
    pub const RENEWABLE: [PolicyStatus; 2] = [PolicyStatus::Active, PolicyStatus::PendingRenewal];

    pub fn is_renewable(&self) -> bool {
        Self::RENEWABLE.contains(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    /// Line of business, e.g. "auto", "home", "commercial".
    pub policy_type: String,
    pub end_date: Option<NaiveDate>,
    pub status: PolicyStatus,
    pub created_by_id: UserId,
}

/// A policy joined with its client's display name, which renewal descriptions quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewablePolicy {
    pub policy: Policy,
    pub client_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Renewal,
    FollowUp,
    Call,
    Other,
}

wire_enum!(TaskType, "task type" {
    Renewal => "renewal",
    FollowUp => "follow_up",
    Call => "call",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Waiting,
    Done,
}

wire_enum!(TaskStatus, "task status" {
    Todo => "todo",
    InProgress => "in_progress",
    Waiting => "waiting",
    Done => "done",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

wire_enum!(TaskPriority, "task priority" {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub policy_id: Option<PolicyId>,
    pub client_id: Option<ClientId>,
    /// Set only on renewal tasks: 60, 30 or 7.
    pub renewal_days_before: Option<u32>,
    pub assigned_to_id: Option<UserId>,
    pub created_by_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// The user a task belongs to for digest purposes: its assignee, else its creator.
    pub fn owner_id(&self) -> &UserId {
        self.assigned_to_id.as_ref().unwrap_or(&self.created_by_id)
    }
}

/// Insert payload for a renewal reminder. Content is fixed at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRenewalTask {
    pub tenant_id: TenantId,
    pub policy_id: PolicyId,
    pub client_id: ClientId,
    pub renewal_days_before: u32,
    pub priority: TaskPriority,
    pub due_date: NaiveDate,
    pub title: String,
    pub description: String,
    pub created_by_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCategory {
    pub category: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub limit_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_limit: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub created_by_id: UserId,
    #[serde(default)]
    pub categories: Vec<BudgetCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBudget {
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_limit: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_by_id: UserId,
    #[serde(default)]
    pub categories: Vec<BudgetCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
}

wire_enum!(ExpenseStatus, "expense status" {
    Draft => "draft",
    PendingApproval => "pending_approval",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Weekly,
    Monthly,
    Yearly,
}

wire_enum!(Recurrence, "recurrence" {
    Weekly => "weekly",
    Monthly => "monthly",
    Yearly => "yearly",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub tenant_id: TenantId,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub category: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub status: ExpenseStatus,
    pub is_recurring: bool,
    pub recurrence: Option<Recurrence>,
    pub budget_id: Option<BudgetId>,
    pub parent_expense_id: Option<ExpenseId>,
    /// Recurrence cursor: the next date a child expense is due.
    pub next_occurrence: Option<NaiveDate>,
    pub created_by_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    pub tenant_id: TenantId,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub category: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub status: ExpenseStatus,
    pub is_recurring: bool,
    pub recurrence: Option<Recurrence>,
    pub budget_id: Option<BudgetId>,
    pub parent_expense_id: Option<ExpenseId>,
    pub next_occurrence: Option<NaiveDate>,
    pub created_by_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    BudgetWarning,
    RenewalReminder,
    TaskOverdue,
    System,
}

wire_enum!(AlertType, "alert type" {
    BudgetWarning => "budget_warning",
    RenewalReminder => "renewal_reminder",
    TaskOverdue => "task_overdue",
    System => "system",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}
