//! Periodic partition size bounding.
//!
//! Insertion order stands in for recency; there is no access tracking.

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheStorage};
use crate::config::JanitorConfig;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Partitions that were trimmed, with the number of entries removed.
    pub trimmed: Vec<(String, usize)>,
}

impl SweepReport {
    pub fn total_removed(&self) -> usize {
        self.trimmed.iter().map(|(_, n)| n).sum()
    }
}

/// Reduce a partition above `high` entries to `low`, oldest first.
pub fn trim_partition(cache: &mut Cache, high: usize, low: usize) -> usize {
    let len = cache.len();
    if len <= high {
        return 0;
    }
    cache.delete_oldest(len - low.min(len))
}

/// Trim every partition once.
pub async fn sweep(storage: &CacheStorage, config: &JanitorConfig) -> SweepReport {
    let mut report = SweepReport::default();

    for name in storage.keys().await {
        let removed = storage
            .with_cache(&name, |cache| {
                trim_partition(cache, config.high_watermark, config.low_watermark)
            })
            .await;

        match removed {
            Some(0) => {}
            Some(n) => {
                debug!(cache = %name, removed = n, "Trimmed partition");
                report.trimmed.push((name, n));
            }
            None => warn!(cache = %name, "Partition vanished during sweep"),
        }
    }

    report
}

/// Run [`sweep`] every `config.interval()`, first one interval from now.
pub fn spawn_janitor(storage: CacheStorage, config: JanitorConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = config.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = sweep(&storage, &config).await;
            info!(
                partitions = report.trimmed.len(),
                removed = report.total_removed(),
                "Cache cleanup sweep finished"
            );
        }
    })
}
