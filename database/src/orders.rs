use crate::{classify_insertion_error, InsertionError};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use model::order::{ApprovalStatus, FillabilityStatus, Order, OrderKind, RawData, Side, ValidBetween};
use model::token_set::TokenSetId;
use model::{Address, Hash32};
use shared::conversions::{big_decimal_to_u256, h160_from_vec, u256_to_big_decimal};
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct OrderRow {
    hash: Vec<u8>,
    kind: String,
    side: String,
    maker: Vec<u8>,
    token_set_id: String,
    base_price: sqlx::types::BigDecimal,
    value: sqlx::types::BigDecimal,
    listing_time: DateTime<Utc>,
    expiration_time: Option<DateTime<Utc>>,
    nonce: Option<sqlx::types::BigDecimal>,
    payment_token: Option<Vec<u8>>,
    taker_relayer_fee_bps: i32,
    source_id: Option<Vec<u8>>,
    source_bps: Option<i32>,
    royalties: serde_json::Value,
    raw_data: serde_json::Value,
    quantity_remaining: sqlx::types::BigDecimal,
    expiration: Option<DateTime<Utc>>,
    fillability_status: String,
    approval_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> anyhow::Result<Order> {
        let royalties = serde_json::from_value(self.royalties)?;
        let source = match (self.source_id, self.source_bps) {
            (Some(id), Some(bps)) => Some(model::fee::Source {
                id: Address(h160_from_vec(id)?),
                fee_bps: bps as u32,
            }),
            _ => None,
        };
        Ok(Order {
            hash: Hash32::from_bytes(hash32_from_vec(self.hash)?),
            kind: self.kind.parse()?,
            side: self.side.parse()?,
            maker: Address(h160_from_vec(self.maker)?),
            token_set_id: TokenSetId(self.token_set_id),
            base_price: big_decimal_to_u256(&self.base_price)?,
            value: big_decimal_to_u256(&self.value)?,
            valid_between: ValidBetween {
                listing_time: self.listing_time,
                expiration_time: self.expiration_time,
            },
            nonce: self.nonce.map(|n| big_decimal_to_u256(&n)).transpose()?,
            payment_token: self
                .payment_token
                .map(|bytes| h160_from_vec(bytes).map(Address))
                .transpose()?,
            taker_relayer_fee_bps: self.taker_relayer_fee_bps as u32,
            source,
            royalties,
            raw_data: RawData(self.raw_data),
            quantity_remaining: big_decimal_to_u256(&self.quantity_remaining)?,
            expiration: self.expiration,
            fillability_status: self.fillability_status.parse()?,
            approval_status: self.approval_status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn hash32_from_vec(bytes: Vec<u8>) -> anyhow::Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("expected 32 bytes, got {}", v.len()))
}

/// Inserts a newly-resolved order. Idempotent: resubmitting an order with
/// the same hash leaves the existing row untouched and reports no error, the
/// way an intake retry after a timed-out response must behave.
pub async fn insert_order(pool: &PgPool, order: &Order) -> Result<bool, InsertionError> {
    let royalties = serde_json::to_value(&order.royalties).map_err(|err| {
        InsertionError::DbError(sqlx::Error::Protocol(err.to_string()))
    })?;
    let result = sqlx::query(
        r#"
        INSERT INTO orders (
            hash, kind, side, maker, token_set_id, base_price, value,
            listing_time, expiration_time, nonce, payment_token,
            taker_relayer_fee_bps, source_id, source_bps,
            royalties, raw_data, quantity_remaining, expiration, fillability_status, approval_status,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, now(), now())
        ON CONFLICT (hash) DO NOTHING
        "#,
    )
    .bind(order.hash.as_bytes())
    .bind(order.kind.to_string())
    .bind(order.side.to_string())
    .bind(order.maker.as_bytes())
    .bind(&order.token_set_id.0)
    .bind(u256_to_big_decimal(&order.base_price))
    .bind(u256_to_big_decimal(&order.value))
    .bind(order.valid_between.listing_time)
    .bind(order.valid_between.expiration_time)
    .bind(order.nonce.as_ref().map(u256_to_big_decimal))
    .bind(order.payment_token.map(|a| a.as_bytes().to_vec()))
    .bind(order.taker_relayer_fee_bps as i32)
    .bind(order.source.map(|s| s.id.as_bytes().to_vec()))
    .bind(order.source.map(|s| s.fee_bps as i32))
    .bind(royalties)
    .bind(&order.raw_data.0)
    .bind(u256_to_big_decimal(&order.quantity_remaining))
    .bind(order.expiration)
    .bind(order.fillability_status.to_string())
    .bind(order.approval_status.to_string())
    .execute(pool)
    .await
    .map_err(classify_insertion_error)?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_order(pool: &PgPool, hash: Hash32) -> sqlx::Result<Option<Order>> {
    let row: Option<OrderRow> = sqlx::query_as(
        r#"
        SELECT hash, kind, side, maker, token_set_id, base_price, value,
               listing_time, expiration_time, nonce, payment_token,
               taker_relayer_fee_bps, source_id, source_bps,
               royalties, raw_data, quantity_remaining, expiration, fillability_status, approval_status,
               created_at, updated_at
        FROM orders WHERE hash = $1
        "#,
    )
    .bind(hash.as_bytes())
    .fetch_optional(pool)
    .await?;
    row.map(|r| r.into_order().map_err(|err| sqlx::Error::Decode(err.into())))
        .transpose()
}

/// Only writes when the status actually changes, so the `updated_at` bump
/// and the cascading job enqueue it triggers only happen on a real
/// transition, never on a redundant re-derivation that lands on the same
/// value.
pub async fn update_fillability_status(
    pool: &PgPool,
    hash: Hash32,
    new_status: FillabilityStatus,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE orders SET fillability_status = $2, updated_at = now() \
         WHERE hash = $1 AND fillability_status != $2",
    )
    .bind(hash.as_bytes())
    .bind(new_status.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// The authoritative single-order recompute's write: `fillability_status`
/// and `expiration` always change together there (truncated to `now()` on
/// entering `no-balance`, restored to the order's own expiry otherwise), so
/// one statement keeps them consistent rather than risking a read between
/// two separate writes.
pub async fn update_fillability_status_and_expiration(
    pool: &PgPool,
    hash: Hash32,
    new_status: FillabilityStatus,
    expiration: Option<DateTime<Utc>>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE orders SET fillability_status = $2, expiration = $3, updated_at = now() \
         WHERE hash = $1 AND (fillability_status != $2 OR expiration IS DISTINCT FROM $3)",
    )
    .bind(hash.as_bytes())
    .bind(new_status.to_string())
    .bind(expiration)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_approval_status(
    pool: &PgPool,
    hash: Hash32,
    new_status: ApprovalStatus,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE orders SET approval_status = $2, updated_at = now() \
         WHERE hash = $1 AND approval_status != $2",
    )
    .bind(hash.as_bytes())
    .bind(new_status.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Bulk-cancel support: marks every still-fillable order for `maker` with a
/// nonce below `new_nonce` as cancelled, in one statement rather than one
/// row at a time. Returns the hashes it touched so the caller can fan out
/// hash-update jobs, which is what lets a later reorg of the triggering
/// `NonceIncremented` event re-derive these orders instead of leaving them
/// permanently cancelled.
pub async fn cancel_orders_below_nonce(
    pool: &PgPool,
    maker: Address,
    new_nonce: primitive_types::U256,
) -> sqlx::Result<Vec<Hash32>> {
    let rows: Vec<(Vec<u8>,)> = sqlx::query_as(
        "UPDATE orders SET fillability_status = 'cancelled', updated_at = now() \
         WHERE maker = $1 AND nonce < $2 AND fillability_status = 'fillable' \
         RETURNING hash",
    )
    .bind(maker.as_bytes())
    .bind(u256_to_big_decimal(&new_nonce))
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(hash,)| {
            let bytes: [u8; 32] = hash
                .try_into()
                .map_err(|v: Vec<u8>| sqlx::Error::Decode(anyhow::anyhow!("expected 32 byte hash, got {}", v.len()).into()))?;
            Ok(Hash32::from_bytes(bytes))
        })
        .collect()
}

/// Every order for `maker` whose nonce is below the highest bulk-cancel
/// threshold currently on record — the set a `HashUpdateWorker` re-checks
/// against [`crate::events::max_bulk_cancel_nonce`] before trusting a
/// `Cancelled` status that a reorg might have invalidated.
pub async fn order_hashes_with_nonce_below(
    pool: &PgPool,
    maker: Address,
    nonce: primitive_types::U256,
) -> sqlx::Result<Vec<Hash32>> {
    let rows: Vec<(Vec<u8>,)> = sqlx::query_as(
        "SELECT hash FROM orders WHERE maker = $1 AND nonce < $2",
    )
    .bind(maker.as_bytes())
    .bind(u256_to_big_decimal(&nonce))
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(hash,)| {
            let bytes: [u8; 32] = hash
                .try_into()
                .map_err(|v: Vec<u8>| sqlx::Error::Decode(anyhow::anyhow!("expected 32 byte hash, got {}", v.len()).into()))?;
            Ok(Hash32::from_bytes(bytes))
        })
        .collect()
}

/// Flips every still-fillable order whose `expiration_time` has passed to
/// `Expired`. Covers orders nothing else ever revisits: an order with no
/// subsequent transfer, approval, or fill event would otherwise sit in
/// `Fillable` forever past its own deadline, since `hash_update` only
/// recomputes expiry when something else triggers it.
pub async fn expire_stale_orders(pool: &PgPool) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE orders SET fillability_status = 'expired', updated_at = now() \
         WHERE fillability_status = 'fillable' AND expiration_time IS NOT NULL AND expiration_time <= now()",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Marks an order filled and its remaining quantity exhausted in one
/// statement. `OrdersMatched` here carries no partial-fill amount, so a
/// match always consumes everything still outstanding rather than
/// decrementing by a quantity the event doesn't report.
pub async fn fill_order(pool: &PgPool, hash: Hash32) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE orders SET fillability_status = 'filled', quantity_remaining = 0, updated_at = now() \
         WHERE hash = $1 AND fillability_status != 'filled'",
    )
    .bind(hash.as_bytes())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Default, Clone, Debug)]
pub struct OrderFilter {
    pub maker: Option<Address>,
    pub token_set_id: Option<TokenSetId>,
    pub side: Option<Side>,
    pub kind: Option<OrderKind>,
    pub fillability_status: Option<FillabilityStatus>,
}

pub async fn orders(pool: &PgPool, filter: &OrderFilter) -> sqlx::Result<Vec<Order>> {
    let mut query = sqlx::QueryBuilder::new(
        "SELECT hash, kind, side, maker, token_set_id, base_price, value, \
         listing_time, expiration_time, nonce, payment_token, \
         taker_relayer_fee_bps, source_id, source_bps, \
         royalties, raw_data, quantity_remaining, fillability_status, approval_status, \
         created_at, updated_at FROM orders WHERE true",
    );
    if let Some(maker) = filter.maker {
        query.push(" AND maker = ").push_bind(maker.as_bytes().to_vec());
    }
    if let Some(token_set_id) = &filter.token_set_id {
        query.push(" AND token_set_id = ").push_bind(token_set_id.0.clone());
    }
    if let Some(side) = filter.side {
        query.push(" AND side = ").push_bind(side.to_string());
    }
    if let Some(kind) = filter.kind {
        query.push(" AND kind = ").push_bind(kind.to_string());
    }
    if let Some(status) = filter.fillability_status {
        query
            .push(" AND fillability_status = ")
            .push_bind(status.to_string());
    }
    query.push(" ORDER BY created_at DESC");

    let rows = query
        .build_query_as::<OrderRow>()
        .fetch(pool)
        .try_collect::<Vec<_>>()
        .await?;
    rows.into_iter()
        .map(|row| row.into_order().map_err(|err| sqlx::Error::Decode(err.into())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::order::{OrderKind, Side};
    use model::Hash32;
    use primitive_types::U256;

    fn sample_order(hash: [u8; 32]) -> Order {
        let now = Utc::now();
        Order {
            hash: Hash32::from_bytes(hash),
            kind: OrderKind::WyvernV23,
            side: Side::Sell,
            maker: Address::zero(),
            token_set_id: TokenSetId::contract(Address::zero()),
            base_price: U256::from(1_000),
            value: U256::from(1_000),
            valid_between: ValidBetween {
                listing_time: now,
                expiration_time: None,
            },
            nonce: Some(U256::zero()),
            payment_token: None,
            taker_relayer_fee_bps: 0,
            source: None,
            royalties: vec![],
            raw_data: RawData(serde_json::json!({})),
            quantity_remaining: U256::one(),
            expiration: None,
            fillability_status: FillabilityStatus::Fillable,
            approval_status: ApprovalStatus::Approved,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_insert_order_roundtrip() {
        let db = crate::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let order = sample_order([1; 32]);
        assert!(insert_order(db.pool(), &order).await.unwrap());
        assert!(!insert_order(db.pool(), &order).await.unwrap());
        let fetched = get_order(db.pool(), order.hash).await.unwrap().unwrap();
        assert_eq!(fetched.hash, order.hash);
        assert_eq!(fetched.fillability_status, FillabilityStatus::Fillable);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_status_update_is_idempotent_and_conditional() {
        let db = crate::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let order = sample_order([2; 32]);
        insert_order(db.pool(), &order).await.unwrap();

        assert!(
            update_fillability_status(db.pool(), order.hash, FillabilityStatus::NoBalance)
                .await
                .unwrap()
        );
        assert!(
            !update_fillability_status(db.pool(), order.hash, FillabilityStatus::NoBalance)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_expire_stale_orders_only_touches_past_deadlines() {
        let db = crate::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let mut expired = sample_order([4; 32]);
        expired.valid_between.expiration_time = Some(Utc::now() - chrono::Duration::seconds(1));
        insert_order(db.pool(), &expired).await.unwrap();
        let mut still_valid = sample_order([5; 32]);
        still_valid.valid_between.expiration_time = Some(Utc::now() + chrono::Duration::days(1));
        insert_order(db.pool(), &still_valid).await.unwrap();

        let affected = expire_stale_orders(db.pool()).await.unwrap();
        assert_eq!(affected, 1);
        assert_eq!(
            get_order(db.pool(), expired.hash).await.unwrap().unwrap().fillability_status,
            FillabilityStatus::Expired
        );
        assert_eq!(
            get_order(db.pool(), still_valid.hash).await.unwrap().unwrap().fillability_status,
            FillabilityStatus::Fillable
        );
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_fill_order_zeroes_remaining_quantity() {
        let db = crate::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let mut order = sample_order([6; 32]);
        order.quantity_remaining = U256::from(3);
        insert_order(db.pool(), &order).await.unwrap();

        assert!(fill_order(db.pool(), order.hash).await.unwrap());
        assert!(!fill_order(db.pool(), order.hash).await.unwrap());
        let fetched = get_order(db.pool(), order.hash).await.unwrap().unwrap();
        assert_eq!(fetched.fillability_status, FillabilityStatus::Filled);
        assert_eq!(fetched.quantity_remaining, U256::zero());
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_bulk_cancel_below_nonce() {
        let db = crate::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let mut order = sample_order([3; 32]);
        order.nonce = Some(U256::from(1));
        insert_order(db.pool(), &order).await.unwrap();

        let affected = cancel_orders_below_nonce(db.pool(), order.maker, U256::from(2))
            .await
            .unwrap();
        assert_eq!(affected.len(), 1);
        let fetched = get_order(db.pool(), order.hash).await.unwrap().unwrap();
        assert_eq!(fetched.fillability_status, FillabilityStatus::Cancelled);
    }
}
