use anyhow::Result;
use chain_events::ChainLog;
use indexer::ingestor::EventIngestor;
use indexer::reorg::ReorgHandler;
use model::Hash32;

/// What a `Maintaining` event-ingestion tick needs from upstream: newly
/// available decoded-ready logs and any blocks the chain tip has since
/// orphaned. Polling an RPC node to produce this is out of scope here (this
/// system's "core" is the order-lifecycle engine, not a chain client) — the
/// RPC-backed implementation is injected by whatever deploys this binary.
#[async_trait::async_trait]
pub trait DecodedLogSource: Send + Sync {
    async fn poll(&self) -> Result<PolledEvents>;
}

#[derive(Default)]
pub struct PolledEvents {
    pub logs: Vec<ChainLog>,
    pub reorged_blocks: Vec<Hash32>,
}

/// Drives [`ReorgHandler`] and [`EventIngestor`] from whatever [`DecodedLogSource`]
/// is injected, the same way `ExpirySweeper` drives `expire_stale_orders`: a
/// thin periodic tick with no polling loop of its own, folded into the
/// binary's single `ServiceMaintenance` list.
pub struct EventIngestionMaintainer<S> {
    source: S,
    ingestor: EventIngestor,
    reorg_handler: ReorgHandler,
}

impl<S> EventIngestionMaintainer<S> {
    pub fn new(source: S, ingestor: EventIngestor, reorg_handler: ReorgHandler) -> Self {
        Self { source, ingestor, reorg_handler }
    }
}

#[async_trait::async_trait]
impl<S: DecodedLogSource> shared::maintenance::Maintaining for EventIngestionMaintainer<S> {
    async fn run_maintenance(&self) -> Result<()> {
        let polled = self.source.poll().await?;
        for block_hash in polled.reorged_blocks {
            self.reorg_handler.fix(block_hash).await?;
        }
        if !polled.logs.is_empty() {
            self.ingestor.ingest(&polled.logs, false).await?;
        }
        Ok(())
    }
}
