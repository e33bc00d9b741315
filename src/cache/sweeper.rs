use std::{sync::Arc, time::Duration};

use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use super::store::ResponseCache;
use crate::util::shutdown::ShutdownSignal;

/// Runs [`ResponseCache::sweep`] every `interval` until `shutdown` fires.
pub async fn run_sweeper(
    cache: Arc<ResponseCache>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // Skip the first immediate tick

    loop {
        tokio::select! {
            _ = shutdown.triggered() => break,
            _ = ticker.tick() => {
                let report = cache.sweep();
                info!(
                    target = "shelfwise::cache::sweeper",
                    hits = report.stats.hits,
                    misses = report.stats.misses,
                    total = report.stats.total(),
                    hit_rate = format!("{:.1}%", report.stats.hit_rate()),
                    removed = report.removed,
                    retained = report.retained,
                    "Response cache sweep completed"
                );
            }
        }
    }

    info!(target = "shelfwise::cache::sweeper", "Response cache sweeper stopped");
}
