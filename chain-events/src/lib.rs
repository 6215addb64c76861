pub mod decode;
pub mod log;
pub mod signatures;

pub use decode::{decode_log, DecodeError, DecodedEvent};
pub use log::ChainLog;
