use crate::triggers::{FillTrigger, HashUpdateTrigger, MakerUpdateTrigger};
use anyhow::Result;
use chain_events::{decode_log, ChainLog, DecodedEvent};
use database::balances::{self, ApprovalEventRow, TransferEventRow};
use database::events::{self, OrderEventRow};
use database::orders;
use job_queue::JobQueues;
use model::Address;
use primitive_types::U256;
use shared::conversions::u256_to_big_decimal;
use sqlx::PgPool;

/// Decodes raw chain logs into domain events, persists them, and fans out
/// the downstream triggers spec.md §4.1 assigns to each event kind. Never
/// writes an order's own projected fields directly except the one bulk-SQL
/// nonce-cancel shortcut it owns outright; everything else becomes a job.
pub struct EventIngestor {
    pool: PgPool,
    queues: JobQueues,
}

impl EventIngestor {
    pub fn new(pool: PgPool, queues: JobQueues) -> Self {
        Self { pool, queues }
    }

    /// Ingests one batch of logs. `backfill` suppresses trigger jobs: only
    /// event tables are written, because the caller reconstructs
    /// projections in bulk afterward.
    pub async fn ingest(&self, logs: &[ChainLog], backfill: bool) -> Result<()> {
        for log in logs {
            if let Err(err) = self.ingest_one(log, backfill).await {
                tracing::error!(
                    ?err,
                    transaction_hash = %log.transaction_hash,
                    log_index = log.log_index,
                    "failed to ingest log"
                );
            }
        }
        Ok(())
    }

    async fn ingest_one(&self, log: &ChainLog, backfill: bool) -> Result<()> {
        let event = match decode_log(log) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    ?err,
                    transaction_hash = %log.transaction_hash,
                    log_index = log.log_index,
                    "could not decode log, skipping"
                );
                return Ok(());
            }
        };

        match &event {
            DecodedEvent::OrderCancelled { order_hash } => {
                self.insert_order_event(log, &event).await?;
                if !backfill {
                    self.enqueue_hash_update(log, *order_hash).await?;
                }
            }
            DecodedEvent::OrdersMatched {
                maker_order_hash,
                taker_order_hash,
                ..
            } => {
                self.insert_order_event(log, &event).await?;
                if !backfill {
                    self.enqueue_hash_update(log, *maker_order_hash).await?;
                    self.enqueue_hash_update(log, *taker_order_hash).await?;
                    let fill = FillTrigger {
                        maker_order_hash: *maker_order_hash,
                        taker_order_hash: *taker_order_hash,
                    };
                    self.queues
                        .fill
                        .enqueue(
                            &format!("{}-{}", log.transaction_hash, log.log_index),
                            serde_json::to_value(&fill)?,
                        )
                        .await?;
                }
            }
            DecodedEvent::NonceIncremented { maker, new_nonce } => {
                events::insert_bulk_cancel_event(
                    &self.pool,
                    &events::BulkCancelEventRow {
                        block_hash: log.block_hash,
                        block_number: log.block_number,
                        log_index: log.log_index,
                        transaction_hash: log.transaction_hash,
                        maker: *maker,
                        min_nonce: *new_nonce,
                    },
                )
                .await?;
                if !backfill {
                    let cancelled =
                        orders::cancel_orders_below_nonce(&self.pool, *maker, *new_nonce).await?;
                    tracing::info!(
                        maker = %maker,
                        new_nonce = %new_nonce,
                        cancelled = cancelled.len(),
                        "bulk cancel applied"
                    );
                    // A reorg of this very event will delete the row above
                    // without touching the orders it already flipped; fanning
                    // these out as hash-updates lets `HashUpdateWorker`
                    // re-derive them against `max_bulk_cancel_nonce` instead
                    // of leaving them stuck `Cancelled`.
                    for hash in cancelled {
                        self.enqueue_hash_update(log, hash).await?;
                    }
                }
            }
            DecodedEvent::Erc721Transfer {
                contract,
                from,
                to,
                token_id,
            } => {
                balances::insert_transfer_event(
                    &self.pool,
                    &TransferEventRow {
                        block_hash: log.block_hash,
                        block_number: log.block_number,
                        log_index: log.log_index,
                        transaction_hash: log.transaction_hash,
                        contract: *contract,
                        from: *from,
                        to: *to,
                        token_id: *token_id,
                        amount: U256::one(),
                        is_fungible: false,
                    },
                )
                .await?;
                self.move_nft(*from, *to, *contract, *token_id, 1).await?;
                if !backfill {
                    self.enqueue_sell_balance(log, *from, *contract, *token_id).await?;
                    self.enqueue_sell_balance(log, *to, *contract, *token_id).await?;
                }
            }
            DecodedEvent::Erc1155TransferSingle {
                contract,
                from,
                to,
                token_id,
                value,
                ..
            } => {
                balances::insert_transfer_event(
                    &self.pool,
                    &TransferEventRow {
                        block_hash: log.block_hash,
                        block_number: log.block_number,
                        log_index: log.log_index,
                        transaction_hash: log.transaction_hash,
                        contract: *contract,
                        from: *from,
                        to: *to,
                        token_id: *token_id,
                        amount: *value,
                        is_fungible: false,
                    },
                )
                .await?;
                let quantity = value.as_u64().min(i64::MAX as u64) as i64;
                self.move_nft(*from, *to, *contract, *token_id, quantity).await?;
                if !backfill {
                    self.enqueue_sell_balance(log, *from, *contract, *token_id).await?;
                    self.enqueue_sell_balance(log, *to, *contract, *token_id).await?;
                }
            }
            DecodedEvent::Erc1155TransferBatch {
                contract,
                from,
                to,
                token_ids,
                values,
                ..
            } => {
                for (token_id, value) in token_ids.iter().zip(values.iter()) {
                    balances::insert_transfer_event(
                        &self.pool,
                        &TransferEventRow {
                            block_hash: log.block_hash,
                            block_number: log.block_number,
                            log_index: log.log_index,
                            transaction_hash: log.transaction_hash,
                            contract: *contract,
                            from: *from,
                            to: *to,
                            token_id: *token_id,
                            amount: *value,
                            is_fungible: false,
                        },
                    )
                    .await?;
                    let quantity = value.as_u64().min(i64::MAX as u64) as i64;
                    self.move_nft(*from, *to, *contract, *token_id, quantity).await?;
                    if !backfill {
                        self.enqueue_sell_balance(log, *from, *contract, *token_id).await?;
                        self.enqueue_sell_balance(log, *to, *contract, *token_id).await?;
                    }
                }
            }
            DecodedEvent::ApprovalForAll {
                contract,
                owner,
                operator,
                approved,
            } => {
                balances::insert_approval_event(
                    &self.pool,
                    &ApprovalEventRow {
                        block_hash: log.block_hash,
                        block_number: log.block_number,
                        log_index: log.log_index,
                        transaction_hash: log.transaction_hash,
                        contract: *contract,
                        owner: *owner,
                        operator: *operator,
                        approved: *approved,
                    },
                )
                .await?;
                balances::set_nft_approval(&self.pool, *owner, *contract, *operator, *approved)
                    .await?;
                if !backfill {
                    self.enqueue(
                        log,
                        MakerUpdateTrigger::SellApproval {
                            maker: *owner,
                            contract: *contract,
                            operator: *operator,
                        },
                    )
                    .await?;
                }
            }
            DecodedEvent::Erc20Transfer {
                contract,
                from,
                to,
                value,
            } => {
                balances::insert_transfer_event(
                    &self.pool,
                    &TransferEventRow {
                        block_hash: log.block_hash,
                        block_number: log.block_number,
                        log_index: log.log_index,
                        transaction_hash: log.transaction_hash,
                        contract: *contract,
                        from: *from,
                        to: *to,
                        token_id: U256::zero(),
                        amount: *value,
                        is_fungible: true,
                    },
                )
                .await?;
                let delta = u256_to_big_decimal(value);
                balances::adjust_ft_balance(&self.pool, *from, *contract, -delta.clone()).await?;
                balances::adjust_ft_balance(&self.pool, *to, *contract, delta).await?;
                if !backfill {
                    self.enqueue(
                        log,
                        MakerUpdateTrigger::BuyBalance {
                            maker: *from,
                            contract: *contract,
                        },
                    )
                    .await?;
                    self.enqueue(
                        log,
                        MakerUpdateTrigger::BuyBalance {
                            maker: *to,
                            contract: *contract,
                        },
                    )
                    .await?;
                }
            }
            DecodedEvent::Erc20Approval {
                contract,
                owner,
                spender,
                value,
            } => {
                balances::set_ft_allowance(&self.pool, *owner, *contract, *spender, *value).await?;
                if !backfill {
                    self.enqueue(
                        log,
                        MakerUpdateTrigger::BuyApproval {
                            maker: *owner,
                            contract: *contract,
                            operator: Some(*spender),
                            order_kind: None,
                        },
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    async fn insert_order_event(&self, log: &ChainLog, event: &DecodedEvent) -> Result<()> {
        let row = OrderEventRow {
            block_hash: log.block_hash,
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
            event,
        };
        events::insert_order_events(&self.pool, std::slice::from_ref(&row)).await?;
        Ok(())
    }

    async fn move_nft(
        &self,
        from: Address,
        to: Address,
        contract: Address,
        token_id: U256,
        quantity: i64,
    ) -> Result<()> {
        balances::adjust_nft_balance(&self.pool, from, contract, token_id, -quantity).await?;
        balances::adjust_nft_balance(&self.pool, to, contract, token_id, quantity).await?;
        Ok(())
    }

    async fn enqueue(&self, log: &ChainLog, trigger: MakerUpdateTrigger) -> Result<()> {
        let dedup_key = trigger.dedup_key(log.transaction_hash, log.log_index);
        self.queues
            .maker_update
            .enqueue(&dedup_key, serde_json::to_value(&trigger)?)
            .await?;
        Ok(())
    }

    async fn enqueue_sell_balance(
        &self,
        log: &ChainLog,
        maker: Address,
        contract: Address,
        token_id: U256,
    ) -> Result<()> {
        self.enqueue(
            log,
            MakerUpdateTrigger::SellBalance {
                maker,
                contract,
                token_id,
            },
        )
        .await
    }

    async fn enqueue_hash_update(&self, log: &ChainLog, hash: model::Hash32) -> Result<()> {
        let trigger = HashUpdateTrigger { hash };
        let dedup_key = trigger.dedup_key(log.transaction_hash, log.log_index);
        self.queues
            .hash_update
            .enqueue(&dedup_key, serde_json::to_value(&trigger)?)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_events::signatures;
    use model::Hash32;
    use primitive_types::H160;

    fn log_with(topics: Vec<Hash32>, data: Vec<u8>, address: Address) -> ChainLog {
        ChainLog {
            block_hash: Hash32::from_bytes([9; 32]),
            block_number: 100,
            log_index: 0,
            transaction_hash: Hash32::from_bytes([8; 32]),
            address,
            topics,
            data,
        }
    }

    fn address_topic(address: Address) -> Hash32 {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(address.as_bytes());
        Hash32::from_bytes(bytes)
    }

    #[test]
    fn unknown_signature_never_panics_the_decode_step() {
        let log = log_with(vec![Hash32::from_bytes([0xaa; 32])], vec![], Address::zero());
        assert!(decode_log(&log).is_err());
    }

    #[test]
    fn order_cancelled_has_exactly_one_affected_hash() {
        let order_hash = Hash32::from_bytes([0x42; 32]);
        let log = log_with(
            vec![*signatures::ORDER_CANCELLED, order_hash],
            vec![],
            Address::zero(),
        );
        let event = decode_log(&log).unwrap();
        match event {
            DecodedEvent::OrderCancelled { order_hash: h } => assert_eq!(h, order_hash),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn erc721_transfer_decodes_with_both_sides_available_for_fan_out() {
        let from = Address(H160::repeat_byte(1));
        let to = Address(H160::repeat_byte(2));
        let mut token_id_topic = [0u8; 32];
        token_id_topic[31] = 5;
        let log = log_with(
            vec![
                *signatures::ERC721_TRANSFER,
                address_topic(from),
                address_topic(to),
                Hash32::from_bytes(token_id_topic),
            ],
            vec![],
            Address::zero(),
        );
        let event = decode_log(&log).unwrap();
        match event {
            DecodedEvent::Erc721Transfer { from: f, to: t, .. } => {
                assert_eq!(f, from);
                assert_eq!(t, to);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
