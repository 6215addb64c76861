use crate::job::{Job, JobId};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const INITIAL_BACKOFF_SECONDS: u64 = 10;
const BACKOFF_FACTOR: u64 = 2;
const MAX_ATTEMPTS: u32 = 5;
const JOB_TIMEOUT_SECONDS: i64 = 60;
const MAX_COMPLETED_RETAINED: isize = 1000;
const MAX_FAILED_RETAINED: isize = 10000;

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// A single named, Redis-backed queue: deduped by job id, retried with
/// exponential backoff, bounded retention on completed/failed history.
///
/// Layout, all keys prefixed by `{name}:`:
/// - `scheduled` — sorted set, member job id, score unix-millis ready time.
/// - `job:{id}` — hash holding the payload and attempt count.
/// - `processing` — sorted set, member job id, score lease deadline.
/// - `completed` / `failed` — capped lists of job ids, most recent first.
#[derive(Clone)]
pub struct JobQueue {
    redis: ConnectionManager,
    name: String,
}

impl JobQueue {
    pub fn new(redis: ConnectionManager, name: impl Into<String>) -> Self {
        Self {
            redis,
            name: name.into(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.name, suffix)
    }

    fn job_key(&self, id: &JobId) -> String {
        self.key(&format!("job:{}", id.0))
    }

    /// Enqueues `payload` under a deterministic id derived from `dedup_key`.
    /// If a job with the same id is already scheduled or being processed,
    /// this is a no-op: the two triggers coalesce into one piece of work.
    pub async fn enqueue(
        &self,
        dedup_key: &str,
        payload: serde_json::Value,
    ) -> Result<JobId, JobQueueError> {
        let id = JobId::from_dedup_key(&self.name, dedup_key);
        let mut conn = self.redis.clone();

        let already_processing: bool = conn
            .zscore::<_, _, Option<f64>>(self.key("processing"), &id.0)
            .await?
            .is_some();
        if already_processing {
            return Ok(id);
        }

        let job = Job {
            id: id.clone(),
            attempt: 0,
            payload,
        };
        let body = serde_json::to_string(&job)?;
        let now = now_millis();

        // `SETNX` on the body key means a second enqueue with the same
        // dedup key never overwrites an in-flight job's attempt count.
        // `ZADD NX` on the schedule means it never re-schedules a job that
        // a previous enqueue already placed (and a worker may have already
        // popped, in which case it simply won't be there to re-add).
        let _: bool = conn.set_nx(self.job_key(&id), &body).await?;
        let _: i32 = redis::cmd("ZADD")
            .arg(self.key("scheduled"))
            .arg("NX")
            .arg(now as f64)
            .arg(&id.0)
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    /// Pops the oldest ready job (`score <= now`), moving it into the
    /// `processing` set with a lease deadline so a crashed worker's job can
    /// be recovered by `reclaim_expired`.
    pub async fn dequeue(&self) -> Result<Option<Job>, JobQueueError> {
        let mut conn = self.redis.clone();
        let now = now_millis();
        let ids: Vec<String> = conn
            .zrangebyscore_limit(self.key("scheduled"), 0, now as f64, 0, 1)
            .await?;
        let Some(id) = ids.into_iter().next() else {
            return Ok(None);
        };
        let removed: i32 = conn.zrem(self.key("scheduled"), &id).await?;
        if removed == 0 {
            // another worker already took it between ZRANGEBYSCORE and ZREM.
            return Ok(None);
        }
        let deadline = now + (JOB_TIMEOUT_SECONDS * 1000) as u128;
        let _: () = conn.zadd(self.key("processing"), &id, deadline as f64).await?;

        let body: Option<String> = conn.get(self.job_key(&JobId(id.clone()))).await?;
        let Some(body) = body else {
            let _: () = conn.zrem(self.key("processing"), &id).await?;
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&body)?))
    }

    /// Marks a job as done: removes it from `processing`, records it in the
    /// capped `completed` history, deletes its body.
    pub async fn complete(&self, job: &Job) -> Result<(), JobQueueError> {
        let mut conn = self.redis.clone();
        let _: () = conn.zrem(self.key("processing"), job.id_str()).await?;
        let _: () = conn.del(self.job_key(&job.id)).await?;
        let _: () = conn.lpush(self.key("completed"), job.id_str()).await?;
        let _: () = conn.ltrim(self.key("completed"), 0, MAX_COMPLETED_RETAINED - 1).await?;
        Ok(())
    }

    /// Marks an attempt as failed. Reschedules with exponential backoff if
    /// attempts remain, otherwise records the job in the capped `failed`
    /// history and drops its body.
    pub async fn fail(&self, mut job: Job) -> Result<(), JobQueueError> {
        let mut conn = self.redis.clone();
        let _: () = conn.zrem(self.key("processing"), job.id_str()).await?;
        job.attempt += 1;

        if job.attempt >= MAX_ATTEMPTS {
            let _: () = conn.del(self.job_key(&job.id)).await?;
            let _: () = conn.lpush(self.key("failed"), job.id_str()).await?;
            let _: () = conn.ltrim(self.key("failed"), 0, MAX_FAILED_RETAINED - 1).await?;
            return Ok(());
        }

        let backoff_seconds =
            INITIAL_BACKOFF_SECONDS * BACKOFF_FACTOR.pow(job.attempt.saturating_sub(1));
        let ready_at = now_millis() + (backoff_seconds * 1000) as u128;
        let body = serde_json::to_string(&job)?;
        let _: () = conn.set(self.job_key(&job.id), body).await?;
        let _: () = conn.zadd(self.key("scheduled"), job.id_str(), ready_at as f64).await?;
        Ok(())
    }

    /// Requeues any job whose processing lease has expired, i.e. a worker
    /// that took it never called `complete` or `fail` within the timeout.
    pub async fn reclaim_expired(&self) -> Result<usize, JobQueueError> {
        let mut conn = self.redis.clone();
        let now = now_millis();
        let expired: Vec<String> = conn
            .zrangebyscore(self.key("processing"), 0, now as f64)
            .await?;
        for id in &expired {
            let _: () = conn.zrem(self.key("processing"), id).await?;
            let _: () = conn.zadd(self.key("scheduled"), id, now as f64).await?;
        }
        Ok(expired.len())
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_matches_initial_factor_and_cap() {
        let schedule: Vec<u64> = (1..MAX_ATTEMPTS)
            .map(|attempt| INITIAL_BACKOFF_SECONDS * BACKOFF_FACTOR.pow(attempt - 1))
            .collect();
        assert_eq!(schedule, vec![10, 20, 40, 80]);
    }
}
