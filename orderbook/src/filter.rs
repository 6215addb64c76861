use chrono::{DateTime, Duration, Utc};
use database::contracts::{self, ContractKind};
use model::fee::FEE_DENOMINATOR_BPS;
use model::order::{OrderSubmission, Side};
use model::sdk::MarketplaceSdk;
use model::token_set::TokenSetKind;
use sqlx::PgPool;

/// Why a submission was rejected before it ever reaches the resolver. A
/// value, never an `Err`: a bad submission is an everyday outcome of intake,
/// not a failure of the system.
#[derive(Debug, Eq, PartialEq)]
pub enum FilterOutcome {
    Valid,
    Invalid(InvalidReason),
}

#[derive(Debug, Eq, PartialEq)]
pub enum InvalidReason {
    InvalidSignature,
    ListingInTheFuture,
    AlreadyExpired,
    SideAssetMismatch,
    FeeTooHigh,
    TargetContractNotIndexed,
}

/// How far into the future a submission's `listingTime` may be to still be
/// accepted, absorbing clock skew between the submitter and this process.
const LISTING_TIME_SKEW: Duration = Duration::seconds(300);

pub struct OrderFilter<'a> {
    pool: &'a PgPool,
    sdk: &'a dyn MarketplaceSdk,
}

impl<'a> OrderFilter<'a> {
    pub fn new(pool: &'a PgPool, sdk: &'a dyn MarketplaceSdk) -> Self {
        Self { pool, sdk }
    }

    pub async fn check(&self, submission: &OrderSubmission) -> anyhow::Result<FilterOutcome> {
        if self.sdk.recover_signer(submission) != Some(submission.maker) {
            return Ok(FilterOutcome::Invalid(InvalidReason::InvalidSignature));
        }

        let now = Utc::now();
        if let Some(invalid) = check_validity_window(submission, now) {
            return Ok(FilterOutcome::Invalid(invalid));
        }

        if submission.maker_relayer_fee_bps + submission.taker_relayer_fee_bps > FEE_DENOMINATOR_BPS {
            return Ok(FilterOutcome::Invalid(InvalidReason::FeeTooHigh));
        }

        let Some(kind) = contracts::contract_kind(self.pool, submission.target.contract).await? else {
            return Ok(FilterOutcome::Invalid(InvalidReason::TargetContractNotIndexed));
        };
        if !matches_side_convention(submission, kind) {
            return Ok(FilterOutcome::Invalid(InvalidReason::SideAssetMismatch));
        }

        Ok(FilterOutcome::Valid)
    }
}

fn check_validity_window(submission: &OrderSubmission, now: DateTime<Utc>) -> Option<InvalidReason> {
    if submission.valid_between.listing_time > now + LISTING_TIME_SKEW {
        return Some(InvalidReason::ListingInTheFuture);
    }
    if submission.valid_between.has_expired(now) {
        return Some(InvalidReason::AlreadyExpired);
    }
    None
}

/// Buy orders must pay in a known ERC-20; sell orders must target an
/// ERC-721/1155 collection.
fn matches_side_convention(submission: &OrderSubmission, target_kind: ContractKind) -> bool {
    match submission.side {
        Side::Buy => {
            let Some(payment_token) = submission.payment_token else {
                return false;
            };
            payment_token == submission.target.contract && target_kind == ContractKind::Erc20
        }
        Side::Sell => !matches!(target_kind, ContractKind::Erc20),
    }
}
