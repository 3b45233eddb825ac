//! On-demand statistics derived from the prediction store.

use crate::error::PipelineError;
use crate::store::PredictionStore;
use crate::types::verdict::StatisticsSnapshot;
use std::sync::Arc;
use std::time::Instant;

/// Derives rolling counts and rates from the store. Owns no persistent
/// state; every snapshot is recomputed from `PredictionStore::aggregate`.
pub struct StatisticsAggregator {
    store: Arc<PredictionStore>,
    started_at: Instant,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<PredictionStore>) -> Self {
        Self {
            store,
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> Result<StatisticsSnapshot, PipelineError> {
        let agg = self.store.aggregate()?;

        let alert_rate = if agg.total == 0 {
            0.0
        } else {
            agg.alerts as f64 / agg.total as f64
        };

        Ok(StatisticsSnapshot {
            total_requests: agg.total,
            alert_rate,
            requests_per_min: agg.last_minute,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        })
    }
}
