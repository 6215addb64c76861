use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A deterministic job identifier derived from the queue name and a
/// caller-supplied dedup key (e.g. an order hash, a `(block, log index)`
/// pair). Two enqueue calls with the same dedup key always produce the same
/// id, which is what lets Redis coalesce them instead of running the same
/// work twice.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn from_dedup_key(queue: &str, dedup_key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(queue.as_bytes());
        hasher.update([0u8]);
        hasher.update(dedup_key.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{:02x}", byte));
        }
        JobId(hex)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work pulled off the queue: its id, its attempt count so far,
/// and the caller-defined payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub attempt: u32,
    pub payload: serde_json::Value,
}

impl Job {
    pub fn id_str(&self) -> &str {
        &self.id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_dedup_key_yields_same_id() {
        let a = JobId::from_dedup_key("maker-update", "0xabc");
        let b = JobId::from_dedup_key("maker-update", "0xabc");
        assert_eq!(a, b);
    }

    #[test]
    fn different_queues_yield_different_ids_for_the_same_key() {
        let a = JobId::from_dedup_key("maker-update", "0xabc");
        let b = JobId::from_dedup_key("hash-update", "0xabc");
        assert_ne!(a, b);
    }
}
