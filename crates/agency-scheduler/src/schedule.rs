use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};

/// A six-field cron expression (`sec min hour dom month dow`) evaluated in a
/// fixed IANA timezone, so "01:00" means 01:00 local across DST changes.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
    timezone: Tz,
}

impl CronSchedule {
    pub fn parse(expression: &str, timezone: Tz) -> Result<Self> {
        let schedule = cron::Schedule::from_str(expression)
            .map_err(|e| SchedulerError::InvalidSchedule(format!("{expression}: {e}")))?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
            timezone,
        })
    }

    /// Parse with the timezone given by name, e.g. "America/Toronto".
    pub fn parse_in(expression: &str, timezone: &str) -> Result<Self> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidSchedule(format!("invalid timezone: {timezone}")))?;
        Self::parse(expression, tz)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire time strictly after `from`, in UTC.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = from.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
