use model::Hash32;
use once_cell::sync::Lazy;
use tiny_keccak::{Hasher, Keccak};

fn topic0(signature: &str) -> Hash32 {
    let mut hasher = Keccak::v256();
    hasher.update(signature.as_bytes());
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    Hash32::from_bytes(out)
}

pub static ORDER_CANCELLED: Lazy<Hash32> = Lazy::new(|| topic0("OrderCancelled(bytes32)"));
pub static ORDERS_MATCHED: Lazy<Hash32> = Lazy::new(|| {
    topic0("OrdersMatched(bytes32,bytes32,address,address,uint256,bytes32)")
});
pub static NONCE_INCREMENTED: Lazy<Hash32> =
    Lazy::new(|| topic0("NonceIncremented(address,uint256)"));
pub static ERC721_TRANSFER: Lazy<Hash32> =
    Lazy::new(|| topic0("Transfer(address,address,uint256)"));
pub static ERC1155_TRANSFER_SINGLE: Lazy<Hash32> = Lazy::new(|| {
    topic0("TransferSingle(address,address,address,uint256,uint256)")
});
pub static ERC1155_TRANSFER_BATCH: Lazy<Hash32> = Lazy::new(|| {
    topic0("TransferBatch(address,address,address,uint256[],uint256[])")
});
pub static APPROVAL_FOR_ALL: Lazy<Hash32> =
    Lazy::new(|| topic0("ApprovalForAll(address,address,bool)"));
pub static ERC20_TRANSFER: Lazy<Hash32> =
    Lazy::new(|| topic0("Transfer(address,address,uint256)"));
pub static ERC20_APPROVAL: Lazy<Hash32> =
    Lazy::new(|| topic0("Approval(address,address,uint256)"));
