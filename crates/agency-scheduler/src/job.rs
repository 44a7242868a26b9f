use async_trait::async_trait;

use crate::types::{JobContext, JobReport};

/// A unit of scheduled work. Implementations must be safe to re-run: the
/// engine guarantees at most one concurrent run per trigger, not exactly-once.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: &JobContext) -> agency_core::Result<JobReport>;
}
