//! Per-user daily digest of overdue tasks and upcoming renewal milestones.

use std::fmt::Write as _;
use std::sync::Arc;

use agency_core::types::{Task, Tenant, User};
use agency_core::{AgencyError, Result, Store};
use agency_mail::{EmailMessage, Mailer};
use agency_scheduler::JobReport;
use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use crate::renewals::format_en_ca;

/// What one user's digest contains. Built, rendered, sent and dropped.
#[derive(Debug, Clone)]
pub struct DigestData {
    pub user: User,
    pub today: NaiveDate,
    pub overdue: Vec<Task>,
    pub milestones: Vec<Task>,
}

impl DigestData {
    pub fn is_empty(&self) -> bool {
        self.overdue.is_empty() && self.milestones.is_empty()
    }
}

pub struct DigestCompiler {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    lookahead_days: u32,
    app_url: String,
}

impl DigestCompiler {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, lookahead_days: u32, app_url: impl Into<String>) -> Self {
        Self {
            store,
            mailer,
            lookahead_days,
            app_url: app_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Digests for every user of the tenant who has not opted out, empty ones included.
    pub fn compile_for_tenant(&self, tenant: &Tenant, today: NaiveDate) -> Result<Vec<DigestData>> {
        let horizon = today
            .checked_add_days(Days::new(self.lookahead_days.into()))
            .ok_or_else(|| AgencyError::Internal("digest window overflow".into()))?;
        let overdue = self.store.list_overdue_tasks(&tenant.id, today)?;
        let milestones = self.store.list_renewal_milestones(&tenant.id, today, horizon)?;

        let digests = self
            .store
            .list_users(&tenant.id)?
            .into_iter()
            .filter(|user| !user.digest_opt_out)
            .map(|user| {
                let owned = |t: &&Task| t.owner_id() == &user.id;
                let overdue: Vec<Task> = overdue.iter().filter(owned).cloned().collect();
                let milestones: Vec<Task> = if user.email_renewal_reminders {
                    milestones.iter().filter(owned).cloned().collect()
                } else {
                    Vec::new()
                };
                DigestData {
                    user,
                    today,
                    overdue,
                    milestones,
                }
            })
            .collect();
        Ok(digests)
    }

    /// Send the digest of every opted-in user with something to report.
    /// A user's failed send never blocks the rest of the tenant, and a
    /// tenant's failure never blocks other tenants.
    pub async fn send_daily_digest_for_all_tenants(&self, today: NaiveDate) -> Result<JobReport> {
        let mut report = JobReport::default();
        for tenant in self.store.list_tenants()? {
            match self.send_for_tenant(&tenant, today).await {
                Ok(tenant_report) => report.merge(tenant_report),
                Err(e) => {
                    warn!(tenant_id = %tenant.id, "digest compilation failed: {e}");
                    report.failed += 1;
                }
            }
        }
        info!(%report, mailer = self.mailer.name(), "daily digest finished");
        Ok(report)
    }

    async fn send_for_tenant(&self, tenant: &Tenant, today: NaiveDate) -> Result<JobReport> {
        let mut report = JobReport::default();
        for digest in self.compile_for_tenant(tenant, today)? {
            report.examined += 1;
            if digest.is_empty() {
                debug!(tenant_id = %tenant.id, user_id = %digest.user.id, "nothing to report");
                continue;
            }
            let message = render(&digest, &self.app_url);
            match self.mailer.send(&message).await {
                Ok(_) => {
                    debug!(tenant_id = %tenant.id, user_id = %digest.user.id, "digest sent");
                    report.changed += 1;
                }
                Err(e) => {
                    warn!(tenant_id = %tenant.id, user_id = %digest.user.id, "digest send failed: {e}");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn due_label(task: &Task) -> String {
    task.due_date.map(format_en_ca).unwrap_or_else(|| "no due date".into())
}

fn subject(digest: &DigestData) -> String {
    match (digest.overdue.len(), digest.milestones.len()) {
        (o, 0) => format!("Daily digest: {o} overdue task{}", plural(o)),
        (0, m) => format!("Daily digest: {m} upcoming renewal{}", plural(m)),
        (o, m) => format!(
            "Daily digest: {o} overdue task{}, {m} upcoming renewal{}",
            plural(o),
            plural(m)
        ),
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Build the email for one digest: HTML plus a plain-text alternative.
pub fn render(digest: &DigestData, app_url: &str) -> EmailMessage {
    let mut html = String::new();
    let mut text = String::new();
    let _ = write!(html, "<p>Hi {},</p>", escape(&digest.user.name));
    let _ = writeln!(text, "Hi {},\n", digest.user.name);
    let _ = write!(html, "<p>Here is your summary for {}.</p>", format_en_ca(digest.today));
    let _ = writeln!(text, "Here is your summary for {}.", format_en_ca(digest.today));

    for (heading, tasks) in [
        ("Overdue tasks", &digest.overdue),
        ("Upcoming renewals", &digest.milestones),
    ] {
        if tasks.is_empty() {
            continue;
        }
        let _ = write!(html, "<h3>{heading} ({})</h3><ul>", tasks.len());
        let _ = writeln!(text, "\n{heading} ({}):", tasks.len());
        for task in tasks.iter() {
            let link = format!("{app_url}/tasks/{}", task.id);
            let _ = write!(
                html,
                "<li><a href=\"{}\">{}</a> (due {}, {})</li>",
                escape(&link),
                escape(&task.title),
                due_label(task),
                task.priority,
            );
            let _ = writeln!(
                text,
                "- {} (due {}, {}) {link}",
                task.title,
                due_label(task),
                task.priority
            );
        }
        html.push_str("</ul>");
    }

    let _ = write!(html, "<p><a href=\"{}\">Open dashboard</a></p>", escape(app_url));
    let _ = writeln!(text, "\nOpen dashboard: {app_url}");

    EmailMessage {
        to: digest.user.email.clone(),
        subject: subject(digest),
        html,
        text,
        tag: Some("daily_digest".into()),
    }
}
