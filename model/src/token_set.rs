use crate::address::Address;
use crate::hash::Hash32;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

/// The four ways an order can describe the set of tokens it is willing to
/// trade against.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TokenSetKind {
    Token,
    Range,
    Contract,
    List,
}

/// Canonical, deterministic identifier for a token set. Two orders that
/// describe the same set of tokens always resolve to the same id, so the
/// token-set table can be upserted into rather than duplicated.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Debug, Hash, Serialize, Deserialize)]
pub struct TokenSetId(pub String);

impl TokenSetId {
    pub fn token(contract: Address, token_id: U256) -> Self {
        TokenSetId(format!("token:{}:{}", contract, token_id))
    }

    pub fn range(contract: Address, start_token_id: U256, end_token_id: U256) -> Self {
        TokenSetId(format!(
            "range:{}:{}:{}",
            contract, start_token_id, end_token_id
        ))
    }

    pub fn contract(contract: Address) -> Self {
        TokenSetId(format!("contract:{}", contract))
    }

    pub fn list(contract: Address, merkle_root: Hash32) -> Self {
        TokenSetId(format!("list:{}:{}", contract, merkle_root))
    }

    /// Whether this set's canonical id describes a fixed set of tokens that
    /// provably includes `token_id` on `contract`. `List`-kind ids encode a
    /// Merkle root, not the member tokens, so a transfer of any token on
    /// that contract conservatively counts as a potential match — the
    /// maker-update worker re-derives the real answer against the stored
    /// proof rather than trusting this shortcut.
    pub fn matches_token(&self, contract: Address, token_id: U256) -> bool {
        let mut parts = self.0.splitn(4, ':');
        match parts.next() {
            Some("token") => {
                parts.next() == Some(&contract.to_string())
                    && parts.next() == Some(&token_id.to_string())
            }
            Some("range") => {
                if parts.next() != Some(&contract.to_string()) {
                    return false;
                }
                let start = parts.next().and_then(|s| U256::from_dec_str(s).ok());
                let end = parts.next().and_then(|s| U256::from_dec_str(s).ok());
                matches!((start, end), (Some(start), Some(end)) if token_id >= start && token_id <= end)
            }
            Some("contract") => parts.next() == Some(&contract.to_string()),
            Some("list") => parts.next() == Some(&contract.to_string()),
            _ => false,
        }
    }

    /// The contract every kind of token set id encodes as its second
    /// segment, regardless of kind. Used to filter orders by contract
    /// without caring whether the set is a single token, a range, a whole
    /// contract, or a Merkle list.
    pub fn contract_address(&self) -> Option<Address> {
        self.0.splitn(3, ':').nth(1)?.parse().ok()
    }

    /// The exact `(contract, token_id)` a `Token`-kind id names, or `None`
    /// for any other kind. Used where an exact balance check is only
    /// possible against a single named token, not a range or Merkle set.
    pub fn single_token(&self) -> Option<(Address, U256)> {
        let mut parts = self.0.splitn(3, ':');
        if parts.next() != Some("token") {
            return None;
        }
        let contract = parts.next()?.parse().ok()?;
        let token_id = U256::from_dec_str(parts.next()?).ok()?;
        Some((contract, token_id))
    }
}

impl std::fmt::Display for TokenSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A token set as stored after resolution: the kind, its canonical id, the
/// human/machine label the submitter attached (free-form, only used for
/// display) and its digest, and the Merkle root for `List` sets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenSet {
    pub id: TokenSetId,
    pub kind: TokenSetKind,
    pub contract: Address,
    pub label: serde_json::Value,
    pub label_hash: Hash32,
    pub merkle_root: Option<Hash32>,
}

impl TokenSet {
    /// `sha256` of the label serialized with sorted keys, so that the same
    /// logical label always hashes the same way regardless of field order.
    pub fn compute_label_hash(label: &serde_json::Value) -> anyhow::Result<Hash32> {
        let canonical = canonicalize(label);
        let bytes = serde_json::to_vec(&canonical)?;
        let digest = Sha256::digest(&bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(Hash32::from_bytes(out))
    }
}

/// Recursively sorts object keys so `serde_json::to_vec` produces the same
/// bytes for two JSON values that differ only in field order.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, serde_json::Value> =
                Default::default();
            for (key, value) in map {
                sorted.insert(key.clone(), canonicalize(value));
            }
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(values) => {
            serde_json::Value::Array(values.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

/// The attribute a `List`-kind order submission proves membership for:
/// a token id plus the Merkle proof connecting its leaf to the set's root.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AttributeProof {
    pub token_id: U256,
    pub proof: Vec<Hash32>,
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

fn leaf_hash(token_id: U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    token_id.to_big_endian(&mut bytes);
    keccak256(&bytes)
}

fn hash_pair(a: [u8; 32], b: [u8; 32]) -> [u8; 32] {
    let mut data = [0u8; 64];
    if a <= b {
        data[..32].copy_from_slice(&a);
        data[32..].copy_from_slice(&b);
    } else {
        data[..32].copy_from_slice(&b);
        data[32..].copy_from_slice(&a);
    }
    keccak256(&data)
}

/// Verifies that `attribute` proves membership of `token_id` in the token
/// set identified by `merkle_root`, OpenZeppelin sorted-pair convention.
pub fn verify_membership(merkle_root: Hash32, attribute: &AttributeProof) -> bool {
    let mut node = leaf_hash(attribute.token_id);
    for sibling in &attribute.proof {
        node = hash_pair(node, sibling.0.to_fixed_bytes());
    }
    Hash32::from_bytes(node) == merkle_root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_set_ids_are_deterministic() {
        let contract = Address::zero();
        let a = TokenSetId::token(contract, U256::from(1));
        let b = TokenSetId::token(contract, U256::from(1));
        assert_eq!(a, b);
        assert_ne!(a, TokenSetId::token(contract, U256::from(2)));
    }

    #[test]
    fn label_hash_is_order_independent() {
        let a = serde_json::json!({"collection": "punks", "trait": "blue"});
        let b = serde_json::json!({"trait": "blue", "collection": "punks"});
        assert_eq!(
            TokenSet::compute_label_hash(&a).unwrap(),
            TokenSet::compute_label_hash(&b).unwrap()
        );
    }

    #[test]
    fn single_leaf_tree_proves_itself() {
        let token_id = U256::from(42);
        let root = Hash32::from_bytes(leaf_hash(token_id));
        let attribute = AttributeProof {
            token_id,
            proof: vec![],
        };
        assert!(verify_membership(root, &attribute));
    }

    #[test]
    fn two_leaf_tree_proves_membership_for_both_leaves() {
        let left = U256::from(1);
        let right = U256::from(2);
        let root = Hash32::from_bytes(hash_pair(leaf_hash(left), leaf_hash(right)));

        assert!(verify_membership(
            root,
            &AttributeProof {
                token_id: left,
                proof: vec![Hash32::from_bytes(leaf_hash(right))],
            }
        ));
        assert!(verify_membership(
            root,
            &AttributeProof {
                token_id: right,
                proof: vec![Hash32::from_bytes(leaf_hash(left))],
            }
        ));
    }

    #[test]
    fn contract_address_is_readable_from_every_kind() {
        let contract = Address::zero();
        assert_eq!(
            TokenSetId::token(contract, U256::from(1)).contract_address(),
            Some(contract)
        );
        assert_eq!(
            TokenSetId::contract(contract).contract_address(),
            Some(contract)
        );
    }

    #[test]
    fn single_token_is_only_readable_from_token_kind() {
        let contract = Address::zero();
        assert_eq!(
            TokenSetId::token(contract, U256::from(9)).single_token(),
            Some((contract, U256::from(9)))
        );
        assert_eq!(TokenSetId::contract(contract).single_token(), None);
    }

    #[test]
    fn rejects_a_proof_for_the_wrong_root() {
        let token_id = U256::from(42);
        let attribute = AttributeProof {
            token_id,
            proof: vec![Hash32::from_bytes([0x11; 32])],
        };
        assert!(!verify_membership(Hash32::zero(), &attribute));
    }
}
