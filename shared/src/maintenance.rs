use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;

/// Implemented by every component that needs to periodically refresh some
/// cached state: the proxy registry cache, a balance/approval projection
/// refresher, anything that isn't purely reactive to an incoming event.
#[async_trait::async_trait]
pub trait Maintaining: Send + Sync {
    async fn run_maintenance(&self) -> Result<()>;
}

/// Collects all service components requiring periodic maintenance and runs
/// them concurrently, logging but not propagating individual failures so one
/// broken maintainer never blocks the others.
pub struct ServiceMaintenance {
    pub maintainers: Vec<Arc<dyn Maintaining>>,
}

#[async_trait::async_trait]
impl Maintaining for ServiceMaintenance {
    async fn run_maintenance(&self) -> Result<()> {
        for result in join_all(self.maintainers.iter().map(|m| m.run_maintenance())).await {
            if let Err(err) = result {
                tracing::error!("maintenance task failed with: {:?}", err);
            }
        }
        Ok(())
    }
}

/// Runs `maintenance.run_maintenance()` on a fixed interval until the
/// process exits, the way `orderbook`'s main loop drives its maintenance
/// task off a `tokio::select!` rather than an event source.
pub async fn run_maintenance_forever(
    maintenance: Arc<dyn Maintaining>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(err) = maintenance.run_maintenance().await {
            tracing::error!("maintenance loop failed with: {:?}", err);
        }
    }
}
