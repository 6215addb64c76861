use crate::address::Address;
use crate::fee::{RoyaltyShare, Source};
use crate::hash::Hash32;
use crate::signature::Signature;
use crate::token_set::{AttributeProof, TokenSetId, TokenSetKind};
use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which order protocol produced this order. `WyvernV23` orders carry a
/// `nonce` used for bulk cancellation; `WyvernV2` orders do not. `X2Y2`
/// orders invalidate off-chain the moment their balance or approval
/// drops out, rather than waiting to be separately cancelled.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    WyvernV2,
    WyvernV23,
    X2Y2,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            OrderKind::WyvernV2 => "wyvern-v2",
            OrderKind::WyvernV23 => "wyvern-v2.3",
            OrderKind::X2Y2 => "x2y2",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for OrderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wyvern-v2" => Ok(OrderKind::WyvernV2),
            "wyvern-v2.3" => Ok(OrderKind::WyvernV23),
            "x2y2" => Ok(OrderKind::X2Y2),
            _ => anyhow::bail!("unknown order kind {:?}", s),
        }
    }
}

/// Whether an order is offering to buy or to sell the tokens in its set.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => anyhow::bail!("unknown side {:?}", s),
        }
    }
}

/// Whether an order can currently be filled, derived from balance, approval,
/// cancellation and expiry state rather than stored as independent truth.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FillabilityStatus {
    Fillable,
    NoBalance,
    Cancelled,
    Filled,
    Expired,
}

impl fmt::Display for FillabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            FillabilityStatus::Fillable => "fillable",
            FillabilityStatus::NoBalance => "no-balance",
            FillabilityStatus::Cancelled => "cancelled",
            FillabilityStatus::Filled => "filled",
            FillabilityStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for FillabilityStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "fillable" => FillabilityStatus::Fillable,
            "no-balance" => FillabilityStatus::NoBalance,
            "cancelled" => FillabilityStatus::Cancelled,
            "filled" => FillabilityStatus::Filled,
            "expired" => FillabilityStatus::Expired,
            other => anyhow::bail!("unknown fillability status {:?}", other),
        })
    }
}

/// Whether the maker's token/proxy approval still permits this order to be
/// matched, independent of balance or cancellation state.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Approved,
    NoApproval,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::NoApproval => "no-approval",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ApprovalStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "approved" => ApprovalStatus::Approved,
            "no-approval" => ApprovalStatus::NoApproval,
            other => anyhow::bail!("unknown approval status {:?}", other),
        })
    }
}

/// The window during which an order can be filled.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ValidBetween {
    pub listing_time: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
}

impl ValidBetween {
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration_time, Some(expiration) if expiration <= now)
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.listing_time <= now
    }
}

/// The raw, marketplace-SDK-defined payload a submitter posts. Its shape
/// varies by `kind` and is opaque to us beyond the fields we project out of
/// it at intake time.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RawData(pub serde_json::Value);

/// The membership proof a `List`-kind token set submission must carry.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TokenSetSelector {
    pub kind: TokenSetKind,
    pub contract: Address,
    pub token_id: Option<U256>,
    pub start_token_id: Option<U256>,
    pub end_token_id: Option<U256>,
    /// The root a `List`-kind selector claims its `attribute` proves
    /// membership against. Absent for the other three kinds.
    pub merkle_root: Option<Hash32>,
    pub attribute: Option<AttributeProof>,
    pub label: Option<serde_json::Value>,
}

/// An order exactly as a client submits it, before intake has resolved its
/// token set, attributed its fees, or assigned it a status.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OrderSubmission {
    pub kind: OrderKind,
    pub side: Side,
    pub maker: Address,
    pub base_price: U256,
    pub valid_between: ValidBetween,
    pub nonce: Option<U256>,
    /// The ERC-20 a buy order pays in. `None` for sell orders, which are
    /// paid whatever currency the taker brings.
    pub payment_token: Option<Address>,
    pub maker_relayer_fee_bps: u32,
    pub taker_relayer_fee_bps: u32,
    pub source: Option<Source>,
    pub target: TokenSetSelector,
    /// How many units of the target a sell order offers, or a buy order
    /// wants filled. Always 1 for an ERC-721 single-token order; an
    /// ERC-1155 sell can list more than one copy of the same token.
    pub quantity: U256,
    pub signature: Signature,
    pub raw_data: RawData,
}

/// An order as persisted: the submission plus everything intake resolved
/// from it, plus the status fields the system maintains afterward.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Order {
    pub hash: Hash32,
    pub kind: OrderKind,
    pub side: Side,
    pub maker: Address,
    pub token_set_id: TokenSetId,
    pub base_price: U256,
    pub value: U256,
    pub valid_between: ValidBetween,
    pub nonce: Option<U256>,
    pub payment_token: Option<Address>,
    pub taker_relayer_fee_bps: u32,
    pub source: Option<Source>,
    pub royalties: Vec<RoyaltyShare>,
    pub raw_data: RawData,
    /// Copies of the target still unfilled. A sell order's balance check
    /// passes only once the maker holds at least this many; reaching zero
    /// is what `fillability_status = filled` means.
    pub quantity_remaining: U256,
    /// The effective expiration clients should sort/filter on: the order's
    /// own `valid_between.expiration_time` while fillable, truncated to the
    /// moment it last went `no-balance` so a temporarily-unfillable listing
    /// stops looking "active" without forgetting its real expiry, which
    /// returns once balance does too.
    pub expiration: Option<DateTime<Utc>>,
    pub fillability_status: FillabilityStatus,
    pub approval_status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_kind_roundtrips_through_display() {
        for kind in [OrderKind::WyvernV2, OrderKind::WyvernV23] {
            assert_eq!(kind.to_string().parse::<OrderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn fillability_status_roundtrips_through_display() {
        for status in [
            FillabilityStatus::Fillable,
            FillabilityStatus::NoBalance,
            FillabilityStatus::Cancelled,
            FillabilityStatus::Filled,
            FillabilityStatus::Expired,
        ] {
            assert_eq!(
                status.to_string().parse::<FillabilityStatus>().unwrap(),
                status
            );
        }
    }

    #[test]
    fn valid_between_respects_optional_expiration() {
        let now = Utc::now();
        let never_expires = ValidBetween {
            listing_time: now - chrono::Duration::seconds(1),
            expiration_time: None,
        };
        assert!(!never_expires.has_expired(now));
        assert!(never_expires.has_started(now));
    }
}
