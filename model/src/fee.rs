use crate::address::Address;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

pub const FEE_DENOMINATOR_BPS: u32 = 10_000;

/// A marketplace-fee recipient and how much of an order's value it takes,
/// in basis points of `base_price`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: Address,
    pub fee_bps: u32,
}

/// A royalty recipient registered against a collection, same unit as
/// `Source`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoyaltyShare {
    pub recipient: Address,
    pub bps: u32,
}

/// The result of attributing an order's `base_price` across the
/// marketplace's own cut, collection royalties, and the remainder that
/// actually reaches the order's counterparties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeAttribution {
    pub value: U256,
    pub source_bps: u32,
    pub royalty_bps: u32,
}

/// Errors that make fee attribution meaningless rather than merely
/// undesirable: a caller should reject the order outright rather than let
/// this compute a nonsensical `value`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeeAttributionError {
    #[error("total fee bps {total} exceeds {FEE_DENOMINATOR_BPS}")]
    ExceedsDenominator { total: u32 },
}

/// Computes the net value an order transfers after the marketplace fee and
/// any collection royalties are taken out of `base_price`.
pub fn attribute_fees(
    base_price: U256,
    source: Option<Source>,
    royalties: &[RoyaltyShare],
) -> Result<FeeAttribution, FeeAttributionError> {
    let source_bps = source.map(|s| s.fee_bps).unwrap_or_default();
    let royalty_bps: u32 = royalties.iter().map(|r| r.bps).sum();
    let total_bps = source_bps + royalty_bps;
    if total_bps > FEE_DENOMINATOR_BPS {
        return Err(FeeAttributionError::ExceedsDenominator { total: total_bps });
    }
    let remaining_bps = FEE_DENOMINATOR_BPS - total_bps;
    let value = base_price * U256::from(remaining_bps) / U256::from(FEE_DENOMINATOR_BPS);
    Ok(FeeAttribution {
        value,
        source_bps,
        royalty_bps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_value_when_there_are_no_fees() {
        let attribution = attribute_fees(U256::from(1_000), None, &[]).unwrap();
        assert_eq!(attribution.value, U256::from(1_000));
    }

    #[test]
    fn splits_source_and_royalty_bps() {
        let source = Source {
            id: Address::zero(),
            fee_bps: 250,
        };
        let royalties = [RoyaltyShare {
            recipient: Address::zero(),
            bps: 500,
        }];
        let attribution = attribute_fees(U256::from(10_000), Some(source), &royalties).unwrap();
        assert_eq!(attribution.value, U256::from(9_250));
        assert_eq!(attribution.source_bps, 250);
        assert_eq!(attribution.royalty_bps, 500);
    }

    #[test]
    fn rejects_fees_summing_above_the_denominator() {
        let source = Source {
            id: Address::zero(),
            fee_bps: 9_000,
        };
        let royalties = [RoyaltyShare {
            recipient: Address::zero(),
            bps: 2_000,
        }];
        let err = attribute_fees(U256::from(10_000), Some(source), &royalties).unwrap_err();
        assert_eq!(err, FeeAttributionError::ExceedsDenominator { total: 11_000 });
    }
}
