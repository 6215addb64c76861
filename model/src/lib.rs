pub mod address;
pub mod fee;
pub mod hash;
pub mod order;
pub mod sdk;
pub mod signature;
pub mod step;
pub mod token_set;

pub use address::Address;
pub use hash::Hash32;
pub use order::{ApprovalStatus, FillabilityStatus, Order, OrderKind, OrderSubmission, Side};
pub use signature::Signature;
