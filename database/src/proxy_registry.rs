use model::Address;
use shared::conversions::h160_from_vec;
use sqlx::PgPool;

/// Caches the proxy contract each maker registered with the exchange
/// registry, the way `orderbook`'s `bad_token_cache` caches a slow external
/// lookup behind a read-through table: `get_proxy` never hits the chain
/// itself, only `record_proxy` (called by the ingestor once it observes a
/// proxy registration event) writes.
pub async fn record_proxy(pool: &PgPool, maker: Address, proxy: Address) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO proxy_registrations (maker, proxy)
        VALUES ($1, $2)
        ON CONFLICT (maker) DO UPDATE SET proxy = EXCLUDED.proxy
        "#,
    )
    .bind(maker.as_bytes())
    .bind(proxy.as_bytes())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_proxy(pool: &PgPool, maker: Address) -> sqlx::Result<Option<Address>> {
    let row: Option<(Vec<u8>,)> =
        sqlx::query_as("SELECT proxy FROM proxy_registrations WHERE maker = $1")
            .bind(maker.as_bytes())
            .fetch_optional(pool)
            .await?;
    row.map(|r| h160_from_vec(r.0).map(Address))
        .transpose()
        .map_err(|err| sqlx::Error::Decode(err.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::H160;

    #[tokio::test]
    #[ignore]
    async fn postgres_proxy_registry_roundtrip() {
        let db = crate::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let maker = Address(H160::repeat_byte(1));
        let proxy = Address(H160::repeat_byte(2));
        assert_eq!(get_proxy(db.pool(), maker).await.unwrap(), None);
        record_proxy(db.pool(), maker, proxy).await.unwrap();
        assert_eq!(get_proxy(db.pool(), maker).await.unwrap(), Some(proxy));

        let other_proxy = Address(H160::repeat_byte(3));
        record_proxy(db.pool(), maker, other_proxy).await.unwrap();
        assert_eq!(get_proxy(db.pool(), maker).await.unwrap(), Some(other_proxy));
    }
}
