pub mod job;
pub mod queue;
pub mod queues;

pub use job::{Job, JobId};
pub use queue::{JobQueue, JobQueueError};
pub use queues::JobQueues;
