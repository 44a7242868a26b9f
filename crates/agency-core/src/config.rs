use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEZONE_NAME: &str = "America/Toronto";
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3600;
pub const DEFAULT_TICK_SECS: u64 = 1;
/// Digest lookahead: one day wider than the 60-day milestone so it is never fenced out.
pub const DEFAULT_DIGEST_LOOKAHEAD_DAYS: u32 = 61;
pub const DEFAULT_BUDGET_WARNING_PERCENT: u32 = 80;
pub const DEFAULT_MAX_CATCH_UP: u32 = 366;

/// Top-level config (agency.toml + AGENCY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgencyConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub renewals: RenewalsConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub expenses: ExpensesConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA zone every cron expression is evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Holder name written into `job_locks`. Defaults to a random id per process.
    pub instance_id: Option<String>,
    /// A lock older than this is considered abandoned by a crashed holder.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "TriggerConfig::renewal_tasks")]
    pub renewal_tasks: TriggerConfig,
    #[serde(default = "TriggerConfig::recurring_expenses")]
    pub recurring_expenses: TriggerConfig,
    #[serde(default = "TriggerConfig::budget_auto_renewal")]
    pub budget_auto_renewal: TriggerConfig,
    #[serde(default = "TriggerConfig::daily_digest")]
    pub daily_digest: TriggerConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            instance_id: None,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            tick_secs: DEFAULT_TICK_SECS,
            renewal_tasks: TriggerConfig::renewal_tasks(),
            recurring_expenses: TriggerConfig::recurring_expenses(),
            budget_auto_renewal: TriggerConfig::budget_auto_renewal(),
            daily_digest: TriggerConfig::daily_digest(),
        }
    }
}

/// One cron trigger. Expressions have six fields: sec min hour dom month dow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub cron: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl TriggerConfig {
    fn at(cron: &str) -> Self {
        Self {
            cron: cron.to_string(),
            enabled: true,
        }
    }

    pub fn renewal_tasks() -> Self {
        Self::at("0 0 1 * * *")
    }

    pub fn recurring_expenses() -> Self {
        Self::at("0 0 2 * * *")
    }

    pub fn budget_auto_renewal() -> Self {
        Self::at("0 0 0 1 * *")
    }

    pub fn daily_digest() -> Self {
        Self::at("0 0 8 * * *")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalsConfig {
    #[serde(default = "default_digest_lookahead_days")]
    pub digest_lookahead_days: u32,
}

impl Default for RenewalsConfig {
    fn default() -> Self {
        Self {
            digest_lookahead_days: DEFAULT_DIGEST_LOOKAHEAD_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_budget_warning_percent")]
    pub budget_warning_percent: u32,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            budget_warning_percent: DEFAULT_BUDGET_WARNING_PERCENT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpensesConfig {
    /// Upper bound on children spawned for one parent in one run.
    #[serde(default = "default_max_catch_up")]
    pub max_catch_up: u32,
}

impl Default for ExpensesConfig {
    fn default() -> Self {
        Self {
            max_catch_up: DEFAULT_MAX_CATCH_UP,
        }
    }
}

/// Transactional mail API settings. Without `api_url` digests are logged, not sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_mail_from")]
    pub from: String,
    /// Dashboard base URL linked from digest emails.
    #[serde(default = "default_app_url")]
    pub app_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from: default_mail_from(),
            app_url: default_app_url(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE_NAME.to_string()
}
fn default_lock_ttl_secs() -> u64 {
    DEFAULT_LOCK_TTL_SECS
}
fn default_tick_secs() -> u64 {
    DEFAULT_TICK_SECS
}
fn default_digest_lookahead_days() -> u32 {
    DEFAULT_DIGEST_LOOKAHEAD_DAYS
}
fn default_budget_warning_percent() -> u32 {
    DEFAULT_BUDGET_WARNING_PERCENT
}
fn default_max_catch_up() -> u32 {
    DEFAULT_MAX_CATCH_UP
}
fn default_mail_from() -> String {
    "Agency <no-reply@localhost>".to_string()
}
fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.agency/agency.db", home)
}

impl AgencyConfig {
    /// Load config from a TOML file with AGENCY_* env var overrides.
    ///
    /// Nested keys use a double underscore: `AGENCY_SCHEDULER__TIMEZONE=UTC`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: AgencyConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("AGENCY_").split("__"))
            .extract()
            .map_err(|e| crate::error::AgencyError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Parsed business timezone.
    pub fn timezone(&self) -> crate::error::Result<chrono_tz::Tz> {
        self.scheduler.timezone.parse().map_err(|_| {
            crate::error::AgencyError::Config(format!(
                "invalid timezone: {}",
                self.scheduler.timezone
            ))
        })
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.agency/agency.toml", home)
}
