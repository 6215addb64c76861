use model::address::Address;
use model::hash::Hash32;
use model::order::OrderSubmission;
use model::sdk::MarketplaceSdk;
use secp256k1::recovery::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use tiny_keccak::{Hasher, Keccak};

/// Production `MarketplaceSdk`: standard Ethereum ECDSA recovery over a
/// canonical hash of the submission. The marketplace's own typed-data struct
/// hash is a vendor protocol detail intake trusts an external library to get
/// right; this computes a stable substitute hash over every field but the
/// signature itself, so two semantically identical submissions always hash
/// the same way regardless of who signed them.
pub struct EcdsaSdk;

impl MarketplaceSdk for EcdsaSdk {
    fn order_hash(&self, submission: &OrderSubmission) -> anyhow::Result<Hash32> {
        let mut unsigned = submission.clone();
        unsigned.signature = model::signature::Signature(Vec::new());
        let bytes = serde_json::to_vec(&unsigned)?;
        Ok(Hash32::from_bytes(keccak256(&bytes)))
    }

    fn recover_signer(&self, submission: &OrderSubmission) -> Option<Address> {
        let hash = self.order_hash(submission).ok()?;
        recover_address(hash, submission.signature.as_bytes())
    }
}

fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(bytes);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Recovers the Ethereum address behind a 65-byte `r || s || v` signature
/// over `hash`. `v` is accepted in both the `{0, 1}` and `{27, 28}`
/// conventions, the way submitters from different SDK versions disagree on
/// it in practice.
fn recover_address(hash: Hash32, signature: &[u8]) -> Option<Address> {
    if signature.len() != 65 {
        return None;
    }
    let recovery_id = match signature[64] {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return None,
    };
    let recoverable = RecoverableSignature::from_compact(
        &signature[..64],
        RecoveryId::from_i32(recovery_id).ok()?,
    )
    .ok()?;
    let message = Message::from_slice(hash.as_bytes()).ok()?;
    let public_key = Secp256k1::verification_only()
        .recover(&message, &recoverable)
        .ok()?;
    let uncompressed = public_key.serialize_uncompressed();
    let digest = keccak256(&uncompressed[1..]);
    Some(Address(primitive_types::H160::from_slice(&digest[12..])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_signature_of_the_wrong_length() {
        assert_eq!(recover_address(Hash32::zero(), &[0u8; 10]), None);
    }

    #[test]
    fn rejects_an_out_of_range_recovery_byte() {
        let mut signature = [0u8; 65];
        signature[64] = 4;
        assert_eq!(recover_address(Hash32::zero(), &signature), None);
    }

    #[test]
    fn order_hash_is_independent_of_the_signature_field() {
        use chrono::Utc;
        use model::order::{OrderKind, RawData, Side, TokenSetSelector, ValidBetween};
        use model::signature::Signature;
        use model::token_set::TokenSetKind;
        use primitive_types::U256;

        let base = OrderSubmission {
            kind: OrderKind::WyvernV23,
            side: Side::Sell,
            maker: Address::zero(),
            base_price: U256::from(1),
            valid_between: ValidBetween {
                listing_time: Utc::now(),
                expiration_time: None,
            },
            nonce: None,
            payment_token: None,
            maker_relayer_fee_bps: 0,
            taker_relayer_fee_bps: 0,
            source: None,
            target: TokenSetSelector {
                kind: TokenSetKind::Contract,
                contract: Address::zero(),
                token_id: None,
                start_token_id: None,
                end_token_id: None,
                merkle_root: None,
                attribute: None,
                label: None,
            },
            quantity: U256::one(),
            signature: Signature(vec![1, 2, 3]),
            raw_data: RawData(serde_json::json!({})),
        };
        let mut other = base.clone();
        other.signature = Signature(vec![9, 9, 9, 9]);

        let sdk = EcdsaSdk;
        assert_eq!(sdk.order_hash(&base).unwrap(), sdk.order_hash(&other).unwrap());
    }
}
