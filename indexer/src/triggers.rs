use model::order::OrderKind;
use model::{Address, Hash32};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// A balance or approval observation that may affect a subset of one
/// maker's orders. The dedup key fed to the job queue must be specific
/// enough that two genuinely distinct updates never coalesce, yet general
/// enough that redundant triggers for the same observation do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MakerUpdateTrigger {
    BuyBalance {
        maker: Address,
        contract: Address,
    },
    BuyApproval {
        maker: Address,
        contract: Address,
        operator: Option<Address>,
        order_kind: Option<OrderKind>,
    },
    SellBalance {
        maker: Address,
        contract: Address,
        token_id: U256,
    },
    SellApproval {
        maker: Address,
        contract: Address,
        operator: Address,
    },
}

impl MakerUpdateTrigger {
    pub fn dedup_key(&self, transaction_hash: Hash32, log_index: u64) -> String {
        match self {
            MakerUpdateTrigger::BuyBalance { maker, .. } => {
                format!("{}-{}-{}", transaction_hash, log_index, maker)
            }
            MakerUpdateTrigger::BuyApproval {
                maker, operator, ..
            } => format!(
                "{}-{}-{}-{}",
                transaction_hash,
                log_index,
                maker,
                operator.map(|o| o.to_string()).unwrap_or_default()
            ),
            MakerUpdateTrigger::SellBalance {
                maker, token_id, ..
            } => format!("{}-{}-{}-{}", transaction_hash, log_index, maker, token_id),
            MakerUpdateTrigger::SellApproval {
                maker, operator, ..
            } => format!("{}-{}-{}-{}", transaction_hash, log_index, maker, operator),
        }
    }
}

/// Recomputes a single order's `fillability_status`, `approval_status`,
/// `value`, and expiration from scratch. The authoritative per-order
/// recomputation every other trigger eventually chases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashUpdateTrigger {
    pub hash: Hash32,
}

impl HashUpdateTrigger {
    pub fn dedup_key(&self, transaction_hash: Hash32, log_index: u64) -> String {
        format!("{}-{}-{}", transaction_hash, log_index, self.hash)
    }
}

/// An `OrdersMatched` observation the fill handler applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillTrigger {
    pub maker_order_hash: Hash32,
    pub taker_order_hash: Hash32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sell_balance_dedup_key_is_specific_to_the_token() {
        let maker = Address::zero();
        let contract = Address::zero();
        let tx = Hash32::from_bytes([1; 32]);
        let a = MakerUpdateTrigger::SellBalance {
            maker,
            contract,
            token_id: U256::from(1),
        };
        let b = MakerUpdateTrigger::SellBalance {
            maker,
            contract,
            token_id: U256::from(2),
        };
        assert_ne!(a.dedup_key(tx, 0), b.dedup_key(tx, 0));
    }

    #[test]
    fn same_observation_produces_the_same_key_for_coalescing() {
        let maker = Address::zero();
        let contract = Address::zero();
        let tx = Hash32::from_bytes([1; 32]);
        let trigger = MakerUpdateTrigger::BuyBalance { maker, contract };
        assert_eq!(trigger.dedup_key(tx, 3), trigger.dedup_key(tx, 3));
    }
}
