use chrono::Utc;
use database::{contracts, orders, token_sets};
use job_queue::JobQueue;
use model::fee::{attribute_fees, RoyaltyShare, Source, FEE_DENOMINATOR_BPS};
use model::order::{ApprovalStatus, FillabilityStatus, Order, OrderSubmission, Side};
use model::sdk::MarketplaceSdk;
use model::token_set::{verify_membership, TokenSet, TokenSetId, TokenSetKind};
use model::Address;
use primitive_types::U256;
use sqlx::PgPool;
use std::sync::Arc;

const OPENSEA_FEE_BPS: u32 = 250;

fn opensea_fee_recipient() -> Address {
    "0x5b3256965e7c3cf26e11fcaf296dfc8807c01073"
        .parse()
        .expect("valid address literal")
}

#[derive(Debug, Eq, PartialEq)]
pub enum ResolveOutcome {
    Saved(model::Hash32),
    Rejected(RejectReason),
}

#[derive(Debug, Eq, PartialEq)]
pub enum RejectReason {
    MerkleRootMismatch,
    IncompleteTarget,
}

/// Turns an already-filtered submission into a persisted order: resolves its
/// token set, attributes its fees, computes its net value, and inserts it.
/// Enqueues the initial hash-update afterward so its status gets derived the
/// same way every later status change does, rather than being special-cased
/// here.
pub struct OrderResolver<'a> {
    pool: &'a PgPool,
    hash_update: Arc<JobQueue>,
}

impl<'a> OrderResolver<'a> {
    pub fn new(pool: &'a PgPool, hash_update: Arc<JobQueue>) -> Self {
        Self { pool, hash_update }
    }

    pub async fn save(
        &self,
        sdk: &dyn MarketplaceSdk,
        submission: OrderSubmission,
    ) -> anyhow::Result<ResolveOutcome> {
        let Some(token_set) = resolve_token_set(&submission)? else {
            return Ok(ResolveOutcome::Rejected(RejectReason::MerkleRootMismatch));
        };
        token_sets::upsert_token_set(self.pool, &token_set).await?;

        let source = resolve_source(&submission);
        let total_fee_bps = submission
            .maker_relayer_fee_bps
            .max(submission.taker_relayer_fee_bps);
        let royalty_bps = total_fee_bps.saturating_sub(source.fee_bps);
        let royalties = if royalty_bps > 0 {
            let recipient = contracts::royalty_recipient(self.pool, submission.target.contract)
                .await?
                .unwrap_or_else(Address::zero);
            vec![RoyaltyShare {
                recipient,
                bps: royalty_bps,
            }]
        } else {
            Vec::new()
        };
        // Validates the attribution is sane (total bps doesn't exceed the
        // denominator); its `value` is not used directly, since buy/sell
        // orders compute `value` with their own distinct formula below.
        attribute_fees(submission.base_price, Some(source), &royalties)?;

        let value = match submission.side {
            Side::Sell => submission.base_price,
            Side::Buy => {
                submission.base_price
                    - submission.base_price * U256::from(submission.taker_relayer_fee_bps)
                        / U256::from(FEE_DENOMINATOR_BPS)
            }
        };

        let hash = sdk.order_hash(&submission)?;
        let now = Utc::now();
        let order = Order {
            hash,
            kind: submission.kind,
            side: submission.side,
            maker: submission.maker,
            token_set_id: token_set.id,
            base_price: submission.base_price,
            value,
            valid_between: submission.valid_between,
            nonce: submission.nonce,
            payment_token: submission.payment_token,
            taker_relayer_fee_bps: submission.taker_relayer_fee_bps,
            source: Some(source),
            royalties,
            raw_data: submission.raw_data,
            quantity_remaining: submission.quantity,
            expiration: submission.valid_between.expiration_time,
            fillability_status: FillabilityStatus::Fillable,
            approval_status: ApprovalStatus::NoApproval,
            created_at: now,
            updated_at: now,
        };

        orders::insert_order(self.pool, &order).await?;
        let trigger = indexer::triggers::HashUpdateTrigger { hash: order.hash };
        self.hash_update
            .enqueue(&format!("intake-{}", order.hash), serde_json::to_value(&trigger)?)
            .await?;
        Ok(ResolveOutcome::Saved(order.hash))
    }
}

/// `List`-kind sets verify the submitted per-leaf proof against the claimed
/// root; the other three kinds need no proof since their canonical id alone
/// already identifies the set exactly.
fn resolve_token_set(submission: &OrderSubmission) -> anyhow::Result<Option<TokenSet>> {
    let target = &submission.target;
    let (id, label) = match target.kind {
        TokenSetKind::Token => {
            let token_id = target
                .token_id
                .ok_or_else(|| anyhow::anyhow!("token-kind target missing token_id"))?;
            (
                TokenSetId::token(target.contract, token_id),
                serde_json::json!({"kind": "token", "tokenId": token_id.to_string()}),
            )
        }
        TokenSetKind::Range => {
            let start = target
                .start_token_id
                .ok_or_else(|| anyhow::anyhow!("range-kind target missing start_token_id"))?;
            let end = target
                .end_token_id
                .ok_or_else(|| anyhow::anyhow!("range-kind target missing end_token_id"))?;
            (
                TokenSetId::range(target.contract, start, end),
                serde_json::json!({"kind": "range", "start": start.to_string(), "end": end.to_string()}),
            )
        }
        TokenSetKind::Contract => (
            TokenSetId::contract(target.contract),
            serde_json::json!({"kind": "contract"}),
        ),
        TokenSetKind::List => {
            let root = target
                .merkle_root
                .ok_or_else(|| anyhow::anyhow!("list-kind target missing merkle_root"))?;
            let attribute = target
                .attribute
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("list-kind target missing attribute proof"))?;
            if !verify_membership(root, attribute) {
                return Ok(None);
            }
            (
                TokenSetId::list(target.contract, root),
                target
                    .label
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({"kind": "list"})),
            )
        }
    };
    let label_hash = TokenSet::compute_label_hash(&label)?;
    Ok(Some(TokenSet {
        id,
        kind: target.kind,
        contract: target.contract,
        label,
        label_hash,
        merkle_root: if target.kind == TokenSetKind::List {
            target.merkle_root
        } else {
            None
        },
    }))
}

/// OpenSea's fee recipient gets a fixed 250bps source cut regardless of what
/// the order declares; any other declared source (or none, which collapses
/// to the zero address) keeps whatever bps the order itself specified.
fn resolve_source(submission: &OrderSubmission) -> Source {
    let candidate = submission
        .source
        .map(|source| source.id)
        .unwrap_or_else(Address::zero);
    if candidate == opensea_fee_recipient() {
        Source {
            id: candidate,
            fee_bps: OPENSEA_FEE_BPS,
        }
    } else {
        Source {
            id: candidate,
            fee_bps: submission
                .maker_relayer_fee_bps
                .max(submission.taker_relayer_fee_bps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::hash::Hash32;
    use model::order::{OrderKind, RawData, TokenSetSelector, ValidBetween};
    use model::sdk::test_util::AlwaysValidSdk;
    use model::token_set::AttributeProof;

    /// A sell order declaring OpenSea as fee recipient with a combined
    /// 1000bps: 250bps goes to OpenSea itself, the remaining 750bps is
    /// attributed to the collection's registered royalty recipient.
    #[tokio::test]
    #[ignore]
    async fn postgres_save_attributes_the_opensea_fee_and_the_remaining_royalty() {
        let db = database::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let maker = Address::zero();
        let royalty_recipient = Address(primitive_types::H160::repeat_byte(0x22));
        contracts::register_contract(
            db.pool(),
            Address::zero(),
            database::contracts::ContractKind::Erc721,
            Some(royalty_recipient),
        )
        .await
        .unwrap();

        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let connection = redis::aio::ConnectionManager::new(client).await.unwrap();
        let hash_update = Arc::new(JobQueue::new(connection, "test-hash-update"));
        let resolver = OrderResolver::new(db.pool(), hash_update.clone());
        let sdk = AlwaysValidSdk { signer: maker };

        let mut submission = sample_submission(TokenSetKind::Contract);
        submission.maker = maker;
        submission.source = Some(Source {
            id: "0x5b3256965e7c3cf26e11fcaf296dfc8807c01073".parse().unwrap(),
            fee_bps: 1_000,
        });
        submission.maker_relayer_fee_bps = 1_000;
        submission.taker_relayer_fee_bps = 0;

        let ResolveOutcome::Saved(hash) = resolver.save(&sdk, submission).await.unwrap() else {
            panic!("expected the order to save");
        };
        let order = orders::get_order(db.pool(), hash).await.unwrap().unwrap();
        let source = order.source.unwrap();
        assert_eq!(source.fee_bps, OPENSEA_FEE_BPS);
        assert_eq!(order.royalties, vec![RoyaltyShare { recipient: royalty_recipient, bps: 750 }]);

        let job = hash_update.dequeue().await.unwrap().unwrap();
        let trigger: indexer::triggers::HashUpdateTrigger = serde_json::from_value(job.payload).unwrap();
        assert_eq!(trigger.hash, hash);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_save_splits_an_equal_maker_and_taker_fee_without_double_counting() {
        let db = database::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let maker = Address::zero();
        let royalty_recipient = Address(primitive_types::H160::repeat_byte(0x33));
        contracts::register_contract(
            db.pool(),
            Address::zero(),
            database::contracts::ContractKind::Erc721,
            Some(royalty_recipient),
        )
        .await
        .unwrap();

        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let connection = redis::aio::ConnectionManager::new(client).await.unwrap();
        let hash_update = Arc::new(JobQueue::new(connection, "test-hash-update"));
        let resolver = OrderResolver::new(db.pool(), hash_update.clone());
        let sdk = AlwaysValidSdk { signer: maker };

        // Mirrors scenario S4: maker and taker relayer fees are equal (500
        // bps each), so the effective fee is 500 bps, not their 1000 bps
        // sum. OpenSea keeps its fixed 250 bps share and the collection
        // gets the other 250 bps as royalty.
        let mut submission = sample_submission(TokenSetKind::Contract);
        submission.maker = maker;
        submission.source = Some(Source {
            id: "0x5b3256965e7c3cf26e11fcaf296dfc8807c01073".parse().unwrap(),
            fee_bps: 500,
        });
        submission.maker_relayer_fee_bps = 500;
        submission.taker_relayer_fee_bps = 500;

        let ResolveOutcome::Saved(hash) = resolver.save(&sdk, submission).await.unwrap() else {
            panic!("expected the order to save");
        };
        let order = orders::get_order(db.pool(), hash).await.unwrap().unwrap();
        let source = order.source.unwrap();
        assert_eq!(source.fee_bps, OPENSEA_FEE_BPS);
        assert_eq!(order.royalties, vec![RoyaltyShare { recipient: royalty_recipient, bps: 250 }]);
    }

    fn sample_submission(kind: TokenSetKind) -> OrderSubmission {
        OrderSubmission {
            kind: OrderKind::WyvernV23,
            side: Side::Sell,
            maker: Address::zero(),
            base_price: U256::from(1_000_000_000_000_000_000u64),
            valid_between: ValidBetween {
                listing_time: Utc::now(),
                expiration_time: None,
            },
            nonce: Some(U256::zero()),
            payment_token: None,
            maker_relayer_fee_bps: 250,
            taker_relayer_fee_bps: 0,
            source: None,
            target: TokenSetSelector {
                kind,
                contract: Address::zero(),
                token_id: Some(U256::from(7)),
                start_token_id: Some(U256::from(1)),
                end_token_id: Some(U256::from(10)),
                merkle_root: None,
                attribute: None,
                label: None,
            },
            quantity: U256::one(),
            signature: model::signature::Signature(vec![]),
            raw_data: RawData(serde_json::json!({})),
        }
    }

    #[test]
    fn token_kind_resolves_to_a_deterministic_canonical_id() {
        let set = resolve_token_set(&sample_submission(TokenSetKind::Token))
            .unwrap()
            .unwrap();
        assert_eq!(set.id, TokenSetId::token(Address::zero(), U256::from(7)));
    }

    #[test]
    fn contract_kind_ignores_token_id() {
        let set = resolve_token_set(&sample_submission(TokenSetKind::Contract))
            .unwrap()
            .unwrap();
        assert_eq!(set.id, TokenSetId::contract(Address::zero()));
    }

    #[test]
    fn list_kind_rejects_a_proof_for_the_wrong_root() {
        let mut submission = sample_submission(TokenSetKind::List);
        submission.target.merkle_root = Some(Hash32::zero());
        submission.target.attribute = Some(AttributeProof {
            token_id: U256::from(1),
            proof: vec![Hash32::from_bytes([0x42; 32])],
        });
        let outcome = resolve_token_set(&submission).unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn list_kind_accepts_a_single_leaf_tree_proving_itself() {
        let token_id = U256::from(9);
        let mut bytes = [0u8; 32];
        token_id.to_big_endian(&mut bytes);
        let mut hasher = tiny_keccak::Keccak::v256();
        use tiny_keccak::Hasher as _;
        hasher.update(&bytes);
        let mut leaf = [0u8; 32];
        hasher.finalize(&mut leaf);
        let root = Hash32::from_bytes(leaf);

        let mut submission = sample_submission(TokenSetKind::List);
        submission.target.merkle_root = Some(root);
        submission.target.attribute = Some(AttributeProof {
            token_id,
            proof: vec![],
        });
        let set = resolve_token_set(&submission).unwrap().unwrap();
        assert_eq!(set.id, TokenSetId::list(Address::zero(), root));
    }

    #[test]
    fn opensea_fee_recipient_always_gets_the_fixed_bps_share() {
        let mut submission = sample_submission(TokenSetKind::Contract);
        submission.source = Some(Source {
            id: opensea_fee_recipient(),
            fee_bps: 999,
        });
        submission.maker_relayer_fee_bps = 999;
        let source = resolve_source(&submission);
        assert_eq!(source.fee_bps, OPENSEA_FEE_BPS);
    }

    #[test]
    fn a_non_opensea_source_keeps_the_larger_declared_relayer_fee() {
        let mut submission = sample_submission(TokenSetKind::Contract);
        submission.source = Some(Source {
            id: Address(primitive_types::H160::repeat_byte(0x11)),
            fee_bps: 0,
        });
        submission.maker_relayer_fee_bps = 500;
        submission.taker_relayer_fee_bps = 100;
        let source = resolve_source(&submission);
        assert_eq!(source.fee_bps, 500);
    }

    #[test]
    fn buy_value_nets_out_the_taker_relayer_fee() {
        let mut submission = sample_submission(TokenSetKind::Contract);
        submission.side = Side::Buy;
        submission.payment_token = Some(Address::zero());
        submission.taker_relayer_fee_bps = 250;
        submission.base_price = U256::from(10_000);
        let value = submission.base_price
            - submission.base_price * U256::from(submission.taker_relayer_fee_bps)
                / U256::from(FEE_DENOMINATOR_BPS);
        assert_eq!(value, U256::from(9_750));
    }
}
