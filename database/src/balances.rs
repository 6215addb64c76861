use bigdecimal::BigDecimal;
use model::{Address, Hash32};
use primitive_types::U256;
use shared::conversions::{big_decimal_to_u256, h160_from_vec, u256_to_big_decimal};
use sqlx::PgPool;

/// Raw record of an ERC-721/1155 transfer log, kept so a reorg can be
/// undone by deleting rows and a balance projection rebuilt by replaying
/// them in order.
pub struct TransferEventRow {
    pub block_hash: Hash32,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Hash32,
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
    pub amount: U256,
    /// Whether this row came from an ERC-20 `Transfer` (fungible) or an
    /// ERC-721/1155 transfer (non-fungible), so reorg recovery knows which
    /// balance table a reversal belongs in.
    pub is_fungible: bool,
}

pub async fn insert_transfer_event(pool: &PgPool, row: &TransferEventRow) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO transfer_events
            (block_hash, block_number, log_index, transaction_hash, contract, "from", "to", token_id, amount, is_fungible)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (transaction_hash, log_index) DO NOTHING
        "#,
    )
    .bind(row.block_hash.as_bytes())
    .bind(row.block_number as i64)
    .bind(row.log_index as i64)
    .bind(row.transaction_hash.as_bytes())
    .bind(row.contract.as_bytes())
    .bind(row.from.as_bytes())
    .bind(row.to.as_bytes())
    .bind(u256_to_big_decimal(&row.token_id))
    .bind(u256_to_big_decimal(&row.amount))
    .bind(row.is_fungible)
    .execute(pool)
    .await?;
    Ok(())
}

/// Adjusts the cached NFT balance for `(owner, contract, token_id)` by
/// `delta`, creating the row on first touch. `delta` is signed because a
/// single transfer both debits the sender and credits the receiver.
pub async fn adjust_nft_balance(
    pool: &PgPool,
    owner: Address,
    contract: Address,
    token_id: U256,
    delta: i64,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nft_balances (owner, contract, token_id, quantity)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (owner, contract, token_id)
        DO UPDATE SET quantity = nft_balances.quantity + EXCLUDED.quantity
        "#,
    )
    .bind(owner.as_bytes())
    .bind(contract.as_bytes())
    .bind(u256_to_big_decimal(&token_id))
    .bind(delta)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn nft_balance(
    pool: &PgPool,
    owner: Address,
    contract: Address,
    token_id: U256,
) -> sqlx::Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT quantity FROM nft_balances WHERE owner = $1 AND contract = $2 AND token_id = $3",
    )
    .bind(owner.as_bytes())
    .bind(contract.as_bytes())
    .bind(u256_to_big_decimal(&token_id))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0).unwrap_or(0))
}

/// Adjusts a fungible-token balance by `delta`, positive or negative, the
/// same accumulate-in-place shape as [`adjust_nft_balance`]. Used for ERC-20
/// `Transfer` events, which this system treats as two balance deltas rather
/// than a fetch-and-overwrite against chain state.
pub async fn adjust_ft_balance(
    pool: &PgPool,
    owner: Address,
    contract: Address,
    delta: BigDecimal,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ft_balances (owner, contract, amount)
        VALUES ($1, $2, $3)
        ON CONFLICT (owner, contract)
        DO UPDATE SET amount = ft_balances.amount + EXCLUDED.amount
        "#,
    )
    .bind(owner.as_bytes())
    .bind(contract.as_bytes())
    .bind(delta)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ft_balance(pool: &PgPool, owner: Address, contract: Address) -> sqlx::Result<U256> {
    let row: Option<(sqlx::types::BigDecimal,)> =
        sqlx::query_as("SELECT amount FROM ft_balances WHERE owner = $1 AND contract = $2")
            .bind(owner.as_bytes())
            .bind(contract.as_bytes())
            .fetch_optional(pool)
            .await?;
    row.map(|r| big_decimal_to_u256(&r.0))
        .transpose()
        .map(|v| v.unwrap_or_default())
        .map_err(|err| sqlx::Error::Decode(err.into()))
}

/// Raw record of an `ApprovalForAll`/ERC-20 `Approval` log.
pub struct ApprovalEventRow {
    pub block_hash: Hash32,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Hash32,
    pub contract: Address,
    pub owner: Address,
    pub operator: Address,
    pub approved: bool,
}

pub async fn insert_approval_event(pool: &PgPool, row: &ApprovalEventRow) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO approval_events
            (block_hash, block_number, log_index, transaction_hash, contract, owner, operator, approved)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (transaction_hash, log_index) DO NOTHING
        "#,
    )
    .bind(row.block_hash.as_bytes())
    .bind(row.block_number as i64)
    .bind(row.log_index as i64)
    .bind(row.transaction_hash.as_bytes())
    .bind(row.contract.as_bytes())
    .bind(row.owner.as_bytes())
    .bind(row.operator.as_bytes())
    .bind(row.approved)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_nft_approval(
    pool: &PgPool,
    owner: Address,
    contract: Address,
    operator: Address,
    approved: bool,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nft_approvals (owner, contract, operator, approved)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (owner, contract, operator) DO UPDATE SET approved = EXCLUDED.approved
        "#,
    )
    .bind(owner.as_bytes())
    .bind(contract.as_bytes())
    .bind(operator.as_bytes())
    .bind(approved)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn is_nft_approved(
    pool: &PgPool,
    owner: Address,
    contract: Address,
    operator: Address,
) -> sqlx::Result<bool> {
    let row: Option<(bool,)> = sqlx::query_as(
        "SELECT approved FROM nft_approvals WHERE owner = $1 AND contract = $2 AND operator = $3",
    )
    .bind(owner.as_bytes())
    .bind(contract.as_bytes())
    .bind(operator.as_bytes())
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0).unwrap_or(false))
}

pub async fn set_ft_allowance(
    pool: &PgPool,
    owner: Address,
    contract: Address,
    spender: Address,
    amount: U256,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ft_approvals (owner, contract, spender, amount)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (owner, contract, spender) DO UPDATE SET amount = EXCLUDED.amount
        "#,
    )
    .bind(owner.as_bytes())
    .bind(contract.as_bytes())
    .bind(spender.as_bytes())
    .bind(u256_to_big_decimal(&amount))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn ft_allowance(
    pool: &PgPool,
    owner: Address,
    contract: Address,
    spender: Address,
) -> sqlx::Result<U256> {
    let row: Option<(sqlx::types::BigDecimal,)> = sqlx::query_as(
        "SELECT amount FROM ft_approvals WHERE owner = $1 AND contract = $2 AND spender = $3",
    )
    .bind(owner.as_bytes())
    .bind(contract.as_bytes())
    .bind(spender.as_bytes())
    .fetch_optional(pool)
    .await?;
    row.map(|r| big_decimal_to_u256(&r.0))
        .transpose()
        .map(|v| v.unwrap_or_default())
        .map_err(|err| sqlx::Error::Decode(err.into()))
}

/// A transfer observed in a given block, read back for reorg recovery before
/// its row is deleted.
pub struct TransferEventRecord {
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
    pub amount: U256,
    pub is_fungible: bool,
}

pub async fn transfer_events_in_block(
    pool: &PgPool,
    block_hash: Hash32,
) -> sqlx::Result<Vec<TransferEventRecord>> {
    let rows: Vec<(
        Vec<u8>,
        Vec<u8>,
        Vec<u8>,
        sqlx::types::BigDecimal,
        sqlx::types::BigDecimal,
        bool,
    )> = sqlx::query_as(
        r#"SELECT contract, "from", "to", token_id, amount, is_fungible FROM transfer_events WHERE block_hash = $1"#,
    )
    .bind(block_hash.as_bytes())
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(contract, from, to, token_id, amount, is_fungible)| {
            Ok(TransferEventRecord {
                contract: Address(h160_from_vec(contract).map_err(decode_err)?),
                from: Address(h160_from_vec(from).map_err(decode_err)?),
                to: Address(h160_from_vec(to).map_err(decode_err)?),
                token_id: big_decimal_to_u256(&token_id).map_err(decode_err)?,
                amount: big_decimal_to_u256(&amount).map_err(decode_err)?,
                is_fungible,
            })
        })
        .collect()
}

/// An `ApprovalForAll` observed in a given block, read back for reorg
/// recovery before its row is deleted.
pub struct ApprovalEventRecord {
    pub contract: Address,
    pub owner: Address,
    pub operator: Address,
}

pub async fn approval_events_in_block(
    pool: &PgPool,
    block_hash: Hash32,
) -> sqlx::Result<Vec<ApprovalEventRecord>> {
    let rows: Vec<(Vec<u8>, Vec<u8>, Vec<u8>)> = sqlx::query_as(
        "SELECT contract, owner, operator FROM approval_events WHERE block_hash = $1",
    )
    .bind(block_hash.as_bytes())
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(contract, owner, operator)| {
            Ok(ApprovalEventRecord {
                contract: Address(h160_from_vec(contract).map_err(decode_err)?),
                owner: Address(h160_from_vec(owner).map_err(decode_err)?),
                operator: Address(h160_from_vec(operator).map_err(decode_err)?),
            })
        })
        .collect()
}

fn decode_err(err: anyhow::Error) -> sqlx::Error {
    sqlx::Error::Decode(err.into())
}
