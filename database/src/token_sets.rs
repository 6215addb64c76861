use model::token_set::{TokenSet, TokenSetKind};
use model::{Address, Hash32};
use shared::conversions::h160_from_vec;
use sqlx::PgPool;

/// Upserts a resolved token set. `ON CONFLICT DO NOTHING` on the canonical
/// id: two orders describing the same set race to insert it and only the
/// first write wins, which is fine because the id already encodes every
/// field that matters.
pub async fn upsert_token_set(pool: &PgPool, token_set: &TokenSet) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO token_sets (id, kind, contract, label, label_hash, merkle_root)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(&token_set.id.0)
    .bind(token_set.kind_as_str())
    .bind(token_set.contract.as_bytes())
    .bind(&token_set.label)
    .bind(token_set.label_hash.as_bytes())
    .bind(token_set.merkle_root.map(|root| root.as_bytes().to_vec()))
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct TokenSetRow {
    id: String,
    kind: String,
    contract: Vec<u8>,
    label: serde_json::Value,
    label_hash: Vec<u8>,
    merkle_root: Option<Vec<u8>>,
}

impl TokenSetRow {
    fn into_token_set(self) -> anyhow::Result<TokenSet> {
        Ok(TokenSet {
            id: model::token_set::TokenSetId(self.id),
            kind: parse_kind(&self.kind)?,
            contract: Address(h160_from_vec(self.contract)?),
            label: self.label,
            label_hash: Hash32::from_bytes(self.label_hash.try_into().map_err(|v: Vec<u8>| {
                anyhow::anyhow!("expected 32 byte label hash, got {}", v.len())
            })?),
            merkle_root: self
                .merkle_root
                .map(|bytes| -> anyhow::Result<Hash32> {
                    Ok(Hash32::from_bytes(bytes.try_into().map_err(
                        |v: Vec<u8>| anyhow::anyhow!("expected 32 byte root, got {}", v.len()),
                    )?))
                })
                .transpose()?,
        })
    }
}

fn parse_kind(s: &str) -> anyhow::Result<TokenSetKind> {
    Ok(match s {
        "token" => TokenSetKind::Token,
        "range" => TokenSetKind::Range,
        "contract" => TokenSetKind::Contract,
        "list" => TokenSetKind::List,
        other => anyhow::bail!("unknown token set kind {:?}", other),
    })
}

pub async fn get_token_set(
    pool: &PgPool,
    id: &model::token_set::TokenSetId,
) -> sqlx::Result<Option<TokenSet>> {
    let row: Option<TokenSetRow> = sqlx::query_as(
        "SELECT id, kind, contract, label, label_hash, merkle_root FROM token_sets WHERE id = $1",
    )
    .bind(&id.0)
    .fetch_optional(pool)
    .await?;
    row.map(|r| r.into_token_set().map_err(|err| sqlx::Error::Decode(err.into())))
        .transpose()
}

trait TokenSetKindExt {
    fn kind_as_str(&self) -> &'static str;
}

impl TokenSetKindExt for TokenSet {
    fn kind_as_str(&self) -> &'static str {
        match self.kind {
            TokenSetKind::Token => "token",
            TokenSetKind::Range => "range",
            TokenSetKind::Contract => "contract",
            TokenSetKind::List => "list",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::token_set::TokenSetId;

    #[tokio::test]
    #[ignore]
    async fn postgres_token_set_roundtrip() {
        let db = crate::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let contract = Address::zero();
        let token_set = TokenSet {
            id: TokenSetId::contract(contract),
            kind: TokenSetKind::Contract,
            contract,
            label: serde_json::json!({"name": "punks"}),
            label_hash: Hash32::from_bytes([7; 32]),
            merkle_root: None,
        };
        upsert_token_set(db.pool(), &token_set).await.unwrap();
        let fetched = get_token_set(db.pool(), &token_set.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, token_set.id);
        assert_eq!(fetched.kind, TokenSetKind::Contract);
    }
}
