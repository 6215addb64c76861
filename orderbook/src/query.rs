use database::orders::{self, OrderFilter};
use model::order::{FillabilityStatus, Order, Side};
use model::token_set::TokenSetId;
use model::Hash32;
use primitive_types::U256;
use sqlx::PgPool;

/// The read surface clients use to find fillable orders and the best
/// available price for a token set. No HTTP framework is attached here;
/// this is the data layer a request handler would sit on top of.
pub struct OrderQuery<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderQuery<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn orders(&self, filter: &OrderFilter) -> sqlx::Result<Vec<Order>> {
        orders::orders(self.pool, filter).await
    }

    pub async fn get_order(&self, hash: Hash32) -> sqlx::Result<Option<Order>> {
        orders::get_order(self.pool, hash).await
    }

    /// The highest `value` among fillable buy orders (best bid) or the
    /// lowest `value` among fillable sell orders (best ask) for a token set.
    pub async fn best_price(&self, token_set_id: &TokenSetId, side: Side) -> sqlx::Result<Option<U256>> {
        let filter = OrderFilter {
            token_set_id: Some(token_set_id.clone()),
            side: Some(side),
            fillability_status: Some(FillabilityStatus::Fillable),
            ..Default::default()
        };
        let candidates = orders::orders(self.pool, &filter).await?;
        Ok(match side {
            Side::Buy => candidates.iter().map(|order| order.value).max(),
            Side::Sell => candidates.iter().map(|order| order.value).min(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use database::orders::insert_order;
    use model::order::{ApprovalStatus, OrderKind, RawData, ValidBetween};
    use model::Address;

    fn order(hash: [u8; 32], side: Side, value: u64, token_set_id: TokenSetId) -> Order {
        let now = Utc::now();
        Order {
            hash: Hash32::from_bytes(hash),
            kind: OrderKind::WyvernV23,
            side,
            maker: Address::zero(),
            token_set_id,
            base_price: U256::from(value),
            value: U256::from(value),
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
    async fn postgres_best_price_picks_highest_bid_and_lowest_ask() {
        let db = database::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let token_set_id = TokenSetId::contract(Address::zero());
        insert_order(db.pool(), &order([1; 32], Side::Buy, 100, token_set_id.clone()))
            .await
            .unwrap();
        insert_order(db.pool(), &order([2; 32], Side::Buy, 200, token_set_id.clone()))
            .await
            .unwrap();
        insert_order(db.pool(), &order([3; 32], Side::Sell, 500, token_set_id.clone()))
            .await
            .unwrap();
        insert_order(db.pool(), &order([4; 32], Side::Sell, 300, token_set_id.clone()))
            .await
            .unwrap();

        let query = OrderQuery::new(db.pool());
        assert_eq!(
            query.best_price(&token_set_id, Side::Buy).await.unwrap(),
            Some(U256::from(200))
        );
        assert_eq!(
            query.best_price(&token_set_id, Side::Sell).await.unwrap(),
            Some(U256::from(300))
        );
    }
}
