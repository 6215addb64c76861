use model::{Address, Hash32};

/// A single log entry as delivered by the upstream block/log source. Decode
/// functions never fetch anything themselves; they operate purely on what
/// they're handed here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainLog {
    pub block_hash: Hash32,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Hash32,
    pub address: Address,
    pub topics: Vec<Hash32>,
    pub data: Vec<u8>,
}
