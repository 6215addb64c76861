pub mod fill_handler;
pub mod hash_update;
pub mod ingestor;
pub mod maker_update;
pub mod policy;
pub mod reorg;
pub mod triggers;

pub use fill_handler::FillHandler;
pub use hash_update::HashUpdateWorker;
pub use ingestor::EventIngestor;
pub use maker_update::MakerUpdateWorker;
pub use reorg::ReorgHandler;
