//! Performance counters and latency tracking for the scoring pipeline.
//!
//! These are the hooks the metrics exporter reads; the pipeline increments
//! counters without depending on any exporter wire format.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Total scoring requests accepted into the pipeline
    pub requests_total: AtomicU64,
    /// Total alerts raised (post-filter)
    pub alerts_total: AtomicU64,
    /// Verdicts demoted by the post-filter
    pub filtered_total: AtomicU64,
    /// Cache hits / misses
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Requests rejected by the rate limiter
    pub rate_limited_total: AtomicU64,
    /// Prediction store writes that failed
    pub persistence_failures: AtomicU64,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Model inference times (in microseconds)
    model_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Fused score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            alerts_total: AtomicU64::new(0),
            filtered_total: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            model_times: RwLock::new(HashMap::new()),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a completed scoring request
    pub fn record_request(&self, processing_time: Duration, fused_score: f64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10_000 {
                times.drain(0..5000);
            }
        }

        let bucket = (fused_score * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_alert(&self) {
        self.alerts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.filtered_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record model inference time
    pub fn record_model_time(&self, model_name: &str, duration: Duration) {
        if let Ok(mut times) = self.model_times.write() {
            let model_times = times.entry(model_name.to_string()).or_default();
            model_times.push(duration.as_micros() as u64);
            // Keep only last 1000 per model
            if model_times.len() > 1000 {
                model_times.drain(0..500);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = self.processing_times.read().unwrap();
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_total.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        }
    }

    /// Get fused score distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read().unwrap()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let alerts = self.alerts_total.load(Ordering::Relaxed);
        let alert_rate = if requests > 0 {
            (alerts as f64 / requests as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();

        info!(
            requests = requests,
            alerts = alerts,
            alert_rate_pct = alert_rate,
            filtered = self.filtered_total.load(Ordering::Relaxed),
            throughput_rps = self.get_throughput(),
            cache_hit_rate = self.get_cache_hit_rate(),
            rate_limited = self.rate_limited_total.load(Ordering::Relaxed),
            persistence_failures = self.persistence_failures.load(Ordering::Relaxed),
            latency_mean_us = processing.mean_us,
            latency_p50_us = processing.p50_us,
            latency_p95_us = processing.p95_us,
            latency_p99_us = processing.p99_us,
            "Pipeline metrics summary"
        );

        let model_times = self.model_times.read().unwrap();
        for (model, times) in model_times.iter() {
            if times.is_empty() {
                continue;
            }
            let mut sorted: Vec<u64> = times.clone();
            sorted.sort_unstable();
            let mean = sorted.iter().sum::<u64>() / sorted.len() as u64;
            info!(
                model = %model,
                calls = sorted.len(),
                mean_us = mean,
                p99_us = sorted[(sorted.len() as f64 * 0.99) as usize],
                "Model inference times"
            );
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: std::sync::Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_alert_counters() {
        let metrics = PipelineMetrics::new();

        metrics.record_request(Duration::from_micros(100), 0.5);
        metrics.record_request(Duration::from_micros(200), 0.8);
        metrics.record_alert();

        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.alerts_total.load(Ordering::Relaxed), 1);

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_us, 150);
    }

    #[test]
    fn test_cache_hit_rate() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.get_cache_hit_rate(), 0.0);

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        assert!((metrics.get_cache_hit_rate() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_score_distribution_buckets() {
        let metrics = PipelineMetrics::new();

        metrics.record_request(Duration::from_micros(100), 0.05);
        metrics.record_request(Duration::from_micros(100), 0.95);
        metrics.record_request(Duration::from_micros(100), 1.0);

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[9], 2);
    }
}
