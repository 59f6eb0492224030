use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info};

use crate::service::InventoryService;

/// Background sweep returning stale holds to availability. One instance per
/// process; concurrent replicas are safe because the sweep transaction's
/// row locks let only one of them reclaim a given hold.
pub struct ExpiryWorker {
    service: InventoryService,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ExpiryWorker {
    pub fn new(
        service: InventoryService,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            service,
            interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        let ExpiryWorker {
            service,
            interval,
            mut shutdown,
        } = self;
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service.expire_old_reservations().await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "expired stale reservations"),
                        Err(err) => error!(%err, "reservation expiry sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("expiry worker shutting down");
                    break;
                }
            }
        }
    }
}
