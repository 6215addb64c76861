use crate::triggers::FillTrigger;
use anyhow::Result;
use database::orders;
use job_queue::{Job, JobQueue};
use sqlx::PgPool;
use std::sync::Arc;

/// Marks both sides of an `OrdersMatched` event as filled. Idempotent the
/// same way every status write here is: `fill_order` only writes (and only
/// its caller ever observes a change) on the first delivery of a given
/// fill; a redelivered job is a harmless no-op. `OrdersMatched` carries no
/// partial-fill amount, so a match always exhausts the order's remaining
/// quantity rather than decrementing it by an amount nobody reports.
pub struct FillHandler {
    pool: PgPool,
    queue: Arc<JobQueue>,
}

impl FillHandler {
    pub fn new(pool: PgPool, queue: Arc<JobQueue>) -> Self {
        Self { pool, queue }
    }

    pub async fn run_once(&self) -> Result<bool> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(false);
        };
        match self.handle(&job).await {
            Ok(()) => self.queue.complete(&job).await?,
            Err(err) => {
                tracing::warn!(?err, job_id = %job.id, "fill job failed, will retry");
                self.queue.fail(job).await?;
            }
        }
        Ok(true)
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let trigger: FillTrigger = serde_json::from_value(job.payload.clone())?;
        orders::fill_order(&self.pool, trigger.maker_order_hash).await?;
        orders::fill_order(&self.pool, trigger.taker_order_hash).await?;
        Ok(())
    }
}
