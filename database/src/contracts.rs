use model::Address;
use shared::conversions::h160_from_vec;
use sqlx::PgPool;

/// The asset standard a target contract implements, the way the ingestor
/// needs to know it to decode its logs and intake needs it to check an
/// order's side/asset convention.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum ContractKind {
    Erc20,
    Erc721,
    Erc1155,
}

impl ContractKind {
    fn as_str(&self) -> &'static str {
        match self {
            ContractKind::Erc20 => "erc20",
            ContractKind::Erc721 => "erc721",
            ContractKind::Erc1155 => "erc1155",
        }
    }

    fn parse(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "erc20" => ContractKind::Erc20,
            "erc721" => ContractKind::Erc721,
            "erc1155" => ContractKind::Erc1155,
            other => anyhow::bail!("unknown contract kind {:?}", other),
        })
    }
}

/// Registers (or updates) the asset standard and, for NFT collections, the
/// royalty recipient a target contract resolves fee attribution against.
pub async fn register_contract(
    pool: &PgPool,
    contract: Address,
    kind: ContractKind,
    royalty_recipient: Option<Address>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO contracts (contract, kind, royalty_recipient)
        VALUES ($1, $2, $3)
        ON CONFLICT (contract) DO UPDATE SET kind = EXCLUDED.kind, royalty_recipient = EXCLUDED.royalty_recipient
        "#,
    )
    .bind(contract.as_bytes())
    .bind(kind.as_str())
    .bind(royalty_recipient.map(|a| a.as_bytes().to_vec()))
    .execute(pool)
    .await?;
    Ok(())
}

/// `None` means the contract isn't indexed: order intake's filter step
/// rejects any submission that targets it.
pub async fn contract_kind(pool: &PgPool, contract: Address) -> sqlx::Result<Option<ContractKind>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT kind FROM contracts WHERE contract = $1")
            .bind(contract.as_bytes())
            .fetch_optional(pool)
            .await?;
    row.map(|(kind,)| ContractKind::parse(&kind).map_err(|err| sqlx::Error::Decode(err.into())))
        .transpose()
}

pub async fn royalty_recipient(pool: &PgPool, contract: Address) -> sqlx::Result<Option<Address>> {
    let row: Option<(Option<Vec<u8>>,)> =
        sqlx::query_as("SELECT royalty_recipient FROM contracts WHERE contract = $1")
            .bind(contract.as_bytes())
            .fetch_optional(pool)
            .await?;
    row.and_then(|(recipient,)| recipient)
        .map(|bytes| h160_from_vec(bytes).map(Address))
        .transpose()
        .map_err(|err| sqlx::Error::Decode(err.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::H160;

    #[tokio::test]
    #[ignore]
    async fn postgres_unregistered_contract_has_no_kind() {
        let db = crate::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let contract = Address(H160::repeat_byte(9));
        assert_eq!(contract_kind(db.pool(), contract).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_register_then_read_kind_and_royalty_recipient() {
        let db = crate::Database::new("postgresql://").unwrap();
        db.clear().await.unwrap();
        let contract = Address(H160::repeat_byte(1));
        let recipient = Address(H160::repeat_byte(2));
        register_contract(db.pool(), contract, ContractKind::Erc721, Some(recipient))
            .await
            .unwrap();
        assert_eq!(
            contract_kind(db.pool(), contract).await.unwrap(),
            Some(ContractKind::Erc721)
        );
        assert_eq!(
            royalty_recipient(db.pool(), contract).await.unwrap(),
            Some(recipient)
        );
    }
}
