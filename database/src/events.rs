use chain_events::DecodedEvent;
use model::{Address, Hash32};
use primitive_types::U256;
use shared::conversions::{big_decimal_to_u256, h160_from_vec, u256_to_big_decimal};
use sqlx::{PgPool, Postgres, Transaction};

/// Append-only record of every order-lifecycle event the ingestor decoded,
/// keyed by `(transaction_hash, log_index)` so a re-delivered log (retry, or
/// the same block observed twice before finality) never double-inserts.
pub struct OrderEventRow<'a> {
    pub block_hash: Hash32,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Hash32,
    pub event: &'a DecodedEvent,
}

fn event_kind(event: &DecodedEvent) -> &'static str {
    match event {
        DecodedEvent::OrderCancelled { .. } => "order_cancelled",
        DecodedEvent::OrdersMatched { .. } => "orders_matched",
        _ => unreachable!("non order-lifecycle events are stored in transfer/approval/bulk-cancel tables"),
    }
}

/// Inserts one batch of order-lifecycle events (cancel/fill) in a single
/// transaction, `ON CONFLICT DO NOTHING` on the natural key.
pub async fn insert_order_events(pool: &PgPool, rows: &[OrderEventRow<'_>]) -> sqlx::Result<()> {
    let mut transaction = pool.begin().await?;
    for row in rows {
        insert_order_event(&mut transaction, row).await?;
    }
    transaction.commit().await
}

async fn insert_order_event(
    transaction: &mut Transaction<'_, Postgres>,
    row: &OrderEventRow<'_>,
) -> sqlx::Result<()> {
    let (order_hash, payload) = match row.event {
        DecodedEvent::OrderCancelled { order_hash } => (*order_hash, serde_json::json!({})),
        DecodedEvent::OrdersMatched {
            maker_order_hash,
            taker_order_hash,
            price,
            ..
        } => (
            *maker_order_hash,
            serde_json::json!({ "taker_order_hash": taker_order_hash.to_string(), "price": price.to_string() }),
        ),
        other => panic!("{:?} is not an order-lifecycle event", other),
    };
    sqlx::query(
        r#"
        INSERT INTO order_events
            (block_hash, block_number, log_index, transaction_hash, kind, order_hash, payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (transaction_hash, log_index) DO NOTHING
        "#,
    )
    .bind(row.block_hash.as_bytes())
    .bind(row.block_number as i64)
    .bind(row.log_index as i64)
    .bind(row.transaction_hash.as_bytes())
    .bind(event_kind(row.event))
    .bind(order_hash.as_bytes())
    .bind(payload)
    .execute(&mut *transaction)
    .await?;
    Ok(())
}

/// Every order hash an order-lifecycle event in `block_hash` touched,
/// `orders_matched` contributing both its maker and taker hash. Used by
/// reorg recovery to know which orders need a hash-update once the rows for
/// a replaced block are gone.
pub async fn order_hashes_in_block(pool: &PgPool, block_hash: Hash32) -> sqlx::Result<Vec<Hash32>> {
    let rows: Vec<(String, Vec<u8>, serde_json::Value)> = sqlx::query_as(
        "SELECT kind, order_hash, payload FROM order_events WHERE block_hash = $1",
    )
    .bind(block_hash.as_bytes())
    .fetch_all(pool)
    .await?;

    let mut hashes = Vec::new();
    for (kind, order_hash, payload) in rows {
        let bytes: [u8; 32] = order_hash
            .try_into()
            .map_err(|v: Vec<u8>| sqlx::Error::Decode(anyhow::anyhow!("expected 32 byte hash, got {}", v.len()).into()))?;
        hashes.push(Hash32::from_bytes(bytes));
        if kind == "orders_matched" {
            if let Some(taker) = payload.get("taker_order_hash").and_then(|v| v.as_str()) {
                let taker: Hash32 = taker
                    .parse()
                    .map_err(|err| sqlx::Error::Decode(anyhow::anyhow!("{}", err).into()))?;
                hashes.push(taker);
            }
        }
    }
    Ok(hashes)
}

/// A single `NonceIncremented(maker, min_nonce)` bulk-cancel, recorded the
/// same way `order_events` records a cancel/fill: append-only, keyed by
/// `(transaction_hash, log_index)`, and the single source of truth
/// [`max_bulk_cancel_nonce`] recomputes from, so a reorg that deletes the
/// row is enough to undo the bulk cancel's effect on the next hash-update.
pub struct BulkCancelEventRow {
    pub block_hash: Hash32,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Hash32,
    pub maker: Address,
    pub min_nonce: U256,
}

pub async fn insert_bulk_cancel_event(pool: &PgPool, row: &BulkCancelEventRow) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO bulk_cancel_events
            (block_hash, block_number, log_index, transaction_hash, maker, min_nonce)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (transaction_hash, log_index) DO NOTHING
        "#,
    )
    .bind(row.block_hash.as_bytes())
    .bind(row.block_number as i64)
    .bind(row.log_index as i64)
    .bind(row.transaction_hash.as_bytes())
    .bind(row.maker.as_bytes())
    .bind(u256_to_big_decimal(&row.min_nonce))
    .execute(pool)
    .await?;
    Ok(())
}

/// The highest `min_nonce` any recorded bulk-cancel has set for `maker`, or
/// `None` if this maker never bulk-cancelled. `HashUpdateWorker` compares an
/// order's own nonce against this before trusting a `Cancelled` status, so a
/// reorg that removes the triggering event row is enough to let the order
/// revive on its next hash-update.
pub async fn max_bulk_cancel_nonce(pool: &PgPool, maker: Address) -> sqlx::Result<Option<U256>> {
    let row: (Option<sqlx::types::BigDecimal>,) = sqlx::query_as(
        "SELECT MAX(min_nonce) FROM bulk_cancel_events WHERE maker = $1",
    )
    .bind(maker.as_bytes())
    .fetch_one(pool)
    .await?;
    row.0.map(|nonce| big_decimal_to_u256(&nonce)).transpose().map_err(|err| {
        sqlx::Error::Decode(anyhow::anyhow!("{}", err).into())
    })
}

/// Every `(maker, min_nonce)` bulk-cancel recorded in `block_hash`, read
/// before [`crate::Database::fix_reorged_block`] deletes the rows so the
/// caller can still find and re-enqueue the orders each one touched.
pub async fn bulk_cancel_events_in_block(
    pool: &PgPool,
    block_hash: Hash32,
) -> sqlx::Result<Vec<(Address, U256)>> {
    let rows: Vec<(Vec<u8>, sqlx::types::BigDecimal)> = sqlx::query_as(
        "SELECT maker, min_nonce FROM bulk_cancel_events WHERE block_hash = $1",
    )
    .bind(block_hash.as_bytes())
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(maker, nonce)| {
            let maker = h160_from_vec(maker).map_err(|err| sqlx::Error::Decode(anyhow::anyhow!("{}", err).into()))?;
            let nonce = big_decimal_to_u256(&nonce).map_err(|err| sqlx::Error::Decode(anyhow::anyhow!("{}", err).into()))?;
            Ok((Address(maker), nonce))
        })
        .collect()
}

/// Whether `hash` has a recorded `OrderCancelled` event. Hash-update
/// consults this as the first, stickiest terminal check: a cancellation is
/// never undone short of a reorg deleting the event row itself.
pub async fn is_order_cancelled(pool: &PgPool, hash: Hash32) -> sqlx::Result<bool> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM order_events WHERE kind = 'order_cancelled' AND order_hash = $1",
    )
    .bind(hash.as_bytes())
    .fetch_one(pool)
    .await?;
    Ok(row.0 > 0)
}

/// Whether `hash` appears as either side of a recorded `OrdersMatched`
/// event.
pub async fn is_order_filled(pool: &PgPool, hash: Hash32) -> sqlx::Result<bool> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM order_events
        WHERE kind = 'orders_matched'
          AND (order_hash = $1 OR payload->>'taker_order_hash' = $2)
        "#,
    )
    .bind(hash.as_bytes())
    .bind(hash.to_string())
    .fetch_one(pool)
    .await?;
    Ok(row.0 > 0)
}

/// The highest block number seen across any event table, used to resume
/// ingestion after a restart. `GREATEST` over every table the way the
/// teacher's `block_number_of_most_recent_event` spans trades/invalidations/
/// settlements.
pub async fn block_number_of_most_recent_event(pool: &PgPool) -> sqlx::Result<Option<i64>> {
    let row: (Option<i64>,) = sqlx::query_as(
        r#"
        SELECT GREATEST(
            (SELECT MAX(block_number) FROM order_events),
            (SELECT MAX(block_number) FROM bulk_cancel_events),
            (SELECT MAX(block_number) FROM transfer_events),
            (SELECT MAX(block_number) FROM approval_events)
        )
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}
