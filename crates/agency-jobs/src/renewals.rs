//! Renewal reminder tasks derived from policy end dates.

use std::sync::Arc;

use agency_core::types::{NewRenewalTask, Policy, PolicyId, RenewablePolicy, TaskPriority, TenantId};
use agency_core::{Result, Store};
use agency_scheduler::JobReport;
use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

/// Days before the end date at which a reminder is due, with its priority.
pub const MILESTONES: [(u32, TaskPriority); 3] = [
    (60, TaskPriority::Medium),
    (30, TaskPriority::High),
    (7, TaskPriority::Urgent),
];

const FINAL_MILESTONE_DAYS: u32 = MILESTONES[MILESTONES.len() - 1].0;

/// `en-CA` short date, e.g. 2024-05-01.
pub fn format_en_ca(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Clone)]
pub struct RenewalTasks {
    store: Arc<dyn Store>,
}

impl RenewalTasks {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create the still-future milestone tasks a policy is missing.
    /// Returns the number of tasks created.
    pub fn generate_tasks_for_policy(&self, policy: &RenewablePolicy, today: NaiveDate) -> Result<u32> {
        let p = &policy.policy;
        let Some(end_date) = p.end_date else {
            return Ok(0);
        };

        let mut created = 0;
        for (days_before, priority) in MILESTONES {
            let Some(target) = end_date.checked_sub_days(Days::new(days_before.into())) else {
                continue;
            };
            // Missed milestones are never backfilled, except the final one while
            // the policy is still in force: it becomes due today.
            let due_date = if target >= today {
                target
            } else if days_before == FINAL_MILESTONE_DAYS && end_date >= today {
                today
            } else {
                continue;
            };
            if self
                .store
                .find_open_renewal_task(&p.tenant_id, &p.id, days_before)?
                .is_some()
            {
                continue;
            }
            // Completed for this end date already; a moved end date gets a fresh one.
            if self
                .store
                .has_completed_renewal_task(&p.tenant_id, &p.id, days_before, target, end_date)?
            {
                continue;
            }

            let task = NewRenewalTask {
                tenant_id: p.tenant_id.clone(),
                policy_id: p.id.clone(),
                client_id: p.client_id.clone(),
                renewal_days_before: days_before,
                priority,
                due_date,
                title: format!("Policy renewal in {days_before} days"),
                description: format!(
                    "{} policy for {} expires on {}. Contact the client to start the renewal.",
                    p.policy_type,
                    policy.client_name,
                    format_en_ca(end_date),
                ),
                created_by_id: p.created_by_id.clone(),
            };
            match self.store.create_renewal_task(&task)? {
                Some(created_task) => {
                    debug!(
                        tenant_id = %p.tenant_id,
                        policy_id = %p.id,
                        task_id = %created_task.id,
                        days_before,
                        "renewal task created"
                    );
                    created += 1;
                }
                // Another writer created the same milestone between our read and insert.
                None => debug!(policy_id = %p.id, days_before, "renewal task already open"),
            }
        }
        Ok(created)
    }

    /// Scan every renewable policy of every tenant. One policy or tenant
    /// failing is logged and skipped.
    pub fn generate_renewal_tasks_for_all_tenants(&self, today: NaiveDate) -> Result<JobReport> {
        let mut report = JobReport::default();
        for tenant in self.store.list_tenants()? {
            let policies = match self.store.list_renewable_policies_for_tenant(&tenant.id) {
                Ok(policies) => policies,
                Err(e) => {
                    warn!(tenant_id = %tenant.id, "loading policies failed: {e}");
                    report.failed += 1;
                    continue;
                }
            };
            for policy in &policies {
                report.examined += 1;
                match self.generate_tasks_for_policy(policy, today) {
                    Ok(n) => report.changed += n,
                    Err(e) => {
                        warn!(
                            tenant_id = %tenant.id,
                            policy_id = %policy.policy.id,
                            "renewal task generation failed: {e}"
                        );
                        report.failed += 1;
                    }
                }
            }
        }
        info!(%report, "renewal task generation finished");
        Ok(report)
    }

    /// Remove every open renewal task of the policy. Done tasks stay.
    pub fn delete_renewal_tasks_for_policy(&self, tenant_id: &TenantId, policy_id: &PolicyId) -> Result<usize> {
        let removed = self.store.delete_open_renewal_tasks(tenant_id, policy_id)?;
        if removed > 0 {
            debug!(%tenant_id, %policy_id, removed, "open renewal tasks deleted");
        }
        Ok(removed)
    }

    pub fn regenerate_renewal_tasks(&self, policy: &RenewablePolicy, today: NaiveDate) -> Result<u32> {
        let p = &policy.policy;
        self.delete_renewal_tasks_for_policy(&p.tenant_id, &p.id)?;
        self.generate_tasks_for_policy(policy, today)
    }

    /// Hook for the policy update path. Leaving the renewable statuses drops
    /// open milestones; a new end date on a renewable policy rebuilds them.
    pub fn handle_policy_change(&self, previous: &Policy, current: &Policy, today: NaiveDate) -> Result<u32> {
        if !current.status.is_renewable() {
            if previous.status.is_renewable() {
                self.delete_renewal_tasks_for_policy(&current.tenant_id, &current.id)?;
            }
            return Ok(0);
        }

        let end_changed = previous.end_date != current.end_date;
        if !end_changed && previous.status.is_renewable() {
            return Ok(0);
        }

        let Some(loaded) = self.store.get_policy(&current.tenant_id, &current.id)? else {
            return Err(agency_core::AgencyError::not_found("Policy", &current.id));
        };
        if end_changed {
            self.regenerate_renewal_tasks(&loaded, today)
        } else {
            self.generate_tasks_for_policy(&loaded, today)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestones_are_ordered_by_urgency() {
        let days: Vec<u32> = MILESTONES.iter().map(|(d, _)| *d).collect();
        assert_eq!(days, vec![60, 30, 7]);
        assert!(MILESTONES.windows(2).all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn en_ca_dates_are_iso_like() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(format_en_ca(date), "2024-05-01");
    }
}
