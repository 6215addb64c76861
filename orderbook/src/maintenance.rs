use anyhow::Result;
use job_queue::JobQueue;
use sqlx::PgPool;
use std::sync::Arc;

/// Periodically flips orders past their `expiration_time` to `Expired`, the
/// one piece of status derivation nothing event-driven ever revisits on its
/// own.
pub struct ExpirySweeper {
    pool: PgPool,
}

impl ExpirySweeper {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl shared::maintenance::Maintaining for ExpirySweeper {
    async fn run_maintenance(&self) -> Result<()> {
        let expired = database::orders::expire_stale_orders(&self.pool).await?;
        if expired > 0 {
            tracing::debug!(expired, "swept stale orders to expired");
        }
        Ok(())
    }
}

/// Periodically requeues jobs a crashed worker dequeued but never completed
/// or failed within the lease timeout, so a worker crash mid-job doesn't
/// strand that job in `processing` forever.
pub struct LeaseReclaimer {
    name: &'static str,
    queue: Arc<JobQueue>,
}

impl LeaseReclaimer {
    pub fn new(name: &'static str, queue: Arc<JobQueue>) -> Self {
        Self { name, queue }
    }
}

#[async_trait::async_trait]
impl shared::maintenance::Maintaining for LeaseReclaimer {
    async fn run_maintenance(&self) -> Result<()> {
        let reclaimed = self.queue.reclaim_expired().await?;
        if reclaimed > 0 {
            tracing::warn!(queue = self.name, reclaimed, "reclaimed expired job leases");
        }
        Ok(())
    }
}
