use crate::triggers::{HashUpdateTrigger, MakerUpdateTrigger};
use anyhow::Result;
use database::{balances, events, orders, Database};
use job_queue::JobQueues;
use model::Hash32;

/// Undoes everything a replaced block contributed, then re-enqueues the work
/// needed to re-derive state once the replacement batch lands. Order
/// matters: every read here must happen before [`Database::fix_reorged_block`]
/// deletes the rows being read, and every balance reversal must happen
/// before the deletion too, since it is itself keyed off those same rows.
pub struct ReorgHandler {
    database: Database,
    queues: JobQueues,
}

impl ReorgHandler {
    pub fn new(database: Database, queues: JobQueues) -> Self {
        Self { database, queues }
    }

    pub async fn fix(&self, block_hash: Hash32) -> Result<()> {
        let pool = self.database.pool();
        let mut order_hashes = events::order_hashes_in_block(pool, block_hash).await?;
        let transfers = balances::transfer_events_in_block(pool, block_hash).await?;
        let approvals = balances::approval_events_in_block(pool, block_hash).await?;
        let bulk_cancels = events::bulk_cancel_events_in_block(pool, block_hash).await?;
        for (maker, min_nonce) in &bulk_cancels {
            order_hashes.extend(
                orders::order_hashes_with_nonce_below(pool, *maker, *min_nonce).await?,
            );
        }

        for transfer in &transfers {
            if transfer.is_fungible {
                let delta = shared::conversions::u256_to_big_decimal(&transfer.amount);
                balances::adjust_ft_balance(pool, transfer.from, transfer.contract, delta.clone())
                    .await?;
                balances::adjust_ft_balance(pool, transfer.to, transfer.contract, -delta).await?;
            } else {
                let quantity = transfer.amount.as_u64().min(i64::MAX as u64) as i64;
                balances::adjust_nft_balance(
                    pool,
                    transfer.from,
                    transfer.contract,
                    transfer.token_id,
                    quantity,
                )
                .await?;
                balances::adjust_nft_balance(
                    pool,
                    transfer.to,
                    transfer.contract,
                    transfer.token_id,
                    -quantity,
                )
                .await?;
            }
        }

        self.database.fix_reorged_block(block_hash).await?;

        for hash in order_hashes {
            let trigger = HashUpdateTrigger { hash };
            self.queues
                .hash_update
                .enqueue(&format!("reorg-{}-{}", block_hash, hash), serde_json::to_value(&trigger)?)
                .await?;
        }
        for transfer in &transfers {
            for maker in [transfer.from, transfer.to] {
                let trigger = MakerUpdateTrigger::SellBalance {
                    maker,
                    contract: transfer.contract,
                    token_id: transfer.token_id,
                };
                let dedup_key = format!("reorg-{}-{}", block_hash, trigger.dedup_key(block_hash, 0));
                self.queues
                    .maker_update
                    .enqueue(&dedup_key, serde_json::to_value(&trigger)?)
                    .await?;
            }
        }
        for approval in &approvals {
            let trigger = MakerUpdateTrigger::SellApproval {
                maker: approval.owner,
                contract: approval.contract,
                operator: approval.operator,
            };
            let dedup_key = format!("reorg-{}-{}", block_hash, trigger.dedup_key(block_hash, 0));
            self.queues
                .maker_update
                .enqueue(&dedup_key, serde_json::to_value(&trigger)?)
                .await?;
        }
        Ok(())
    }
}
