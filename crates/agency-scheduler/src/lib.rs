//! `agency-scheduler`: cron triggers, lease locks and run history for the
//! agency background jobs.
//!
//! # Overview
//!
//! Handlers implement [`JobHandler`] and are registered on a
//! [`SchedulerEngine`] under a unique name with a six-field cron expression
//! evaluated in an IANA timezone. The engine ticks every second, fires due
//! triggers and records each firing in the `job_runs` table.
//!
//! # Run statuses
//!
//! | Status            | Meaning                                              |
//! |-------------------|------------------------------------------------------|
//! | `completed`       | Handler returned a [`JobReport`]                     |
//! | `failed`          | Handler returned an error or panicked                |
//! | `skipped_running` | The previous run of the trigger had not finished     |
//! | `skipped_locked`  | Another instance holds the trigger's lease           |

pub mod db;
pub mod engine;
pub mod error;
pub mod job;
pub mod ledger;
pub mod schedule;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use job::JobHandler;
pub use ledger::JobLedger;
pub use schedule::CronSchedule;
pub use types::{JobContext, JobReport, JobRun, RunOutcome, RunStatus, TriggerInfo};
