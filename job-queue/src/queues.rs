use crate::queue::JobQueue;
use redis::aio::ConnectionManager;
use std::sync::Arc;

/// Every named queue this system uses, constructed once in `main` and
/// passed down explicitly to whatever needs to enqueue or consume from it.
/// No global singleton: a worker that needs the maker-update queue takes an
/// `Arc<JobQueue>` in its constructor, the same way `Orderbook` takes its
/// `balance_fetcher` rather than reaching for a static.
#[derive(Clone)]
pub struct JobQueues {
    pub maker_update: Arc<JobQueue>,
    pub hash_update: Arc<JobQueue>,
    pub fill: Arc<JobQueue>,
    pub reorg: Arc<JobQueue>,
}

impl JobQueues {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            maker_update: Arc::new(JobQueue::new(redis.clone(), "maker-update")),
            hash_update: Arc::new(JobQueue::new(redis.clone(), "hash-update")),
            fill: Arc::new(JobQueue::new(redis.clone(), "fill")),
            reorg: Arc::new(JobQueue::new(redis, "reorg")),
        }
    }
}
