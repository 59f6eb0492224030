use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info};

use crate::recommend::RecommendationService;

/// Periodic similarity recalculation, with an optional retention prune of
/// the interaction log before each run.
pub struct SimilarityJob {
    service: RecommendationService,
    interval: Duration,
    retention_days: i64,
    shutdown: watch::Receiver<bool>,
}

impl SimilarityJob {
    pub fn new(
        service: RecommendationService,
        interval: Duration,
        retention_days: i64,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            service,
            interval,
            retention_days,
            shutdown,
        }
    }

    pub async fn run(self) {
        let SimilarityJob {
            service,
            interval,
            retention_days,
            mut shutdown,
        } = self;
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup is not spent
        // recomputing the whole matrix.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service.prune_interactions(retention_days).await {
                        Ok(0) => {}
                        Ok(pruned) => info!(pruned, "pruned old interactions"),
                        Err(err) => error!(%err, "interaction retention prune failed"),
                    }
                    if let Err(err) = service.recalculate_similarities().await {
                        error!(%err, "similarity recalculation failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("similarity job shutting down");
                    break;
                }
            }
        }
    }
}

/// Periodic trending-score recalculation.
pub struct TrendingJob {
    service: RecommendationService,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl TrendingJob {
    pub fn new(
        service: RecommendationService,
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
        let TrendingJob {
            service,
            interval,
            mut shutdown,
        } = self;
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = service.recalculate_trending().await {
                        error!(%err, "trending recalculation failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("trending job shutting down");
                    break;
                }
            }
        }
    }
}
