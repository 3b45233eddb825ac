//! End-to-end request orchestration.
//!
//! Sequences admission, cache lookup, featurization, dual-model scoring,
//! fusion, post-filtering, persistence, and cache population for every
//! scoring request. A request either completes with a verdict, is rejected
//! (rate limit, invalid input), or fails (model unavailable, scoring
//! anomaly); there are no internal retries.

use crate::cache::VerdictCache;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::featurizer::{FeatureVector, SequenceTensor, SessionFeaturizer};
use crate::fusion::EnsembleFuser;
use crate::metrics::PipelineMetrics;
use crate::models::registry::{ModelRegistry, ModelVersion};
use crate::postfilter::PostFilter;
use crate::ratelimit::RateLimiter;
use crate::stats::StatisticsAggregator;
use crate::store::PredictionStore;
use crate::types::event::{Fingerprint, Session};
use crate::types::verdict::{
    ModelVersionInfo, PredictionRecord, StatisticsSnapshot, Verdict, VerdictResponse,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Lightweight liveness summary for the health surface.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub model_loaded: bool,
    pub version_id: Option<String>,
    pub cache_entries: usize,
    pub cache_ttl_secs: u64,
    pub predictions_stored: u64,
}

pub struct InferenceOrchestrator {
    featurizer: SessionFeaturizer,
    registry: Arc<ModelRegistry>,
    fuser: EnsembleFuser,
    post_filter: PostFilter,
    cache: VerdictCache,
    rate_limiter: RateLimiter,
    store: Arc<PredictionStore>,
    stats: StatisticsAggregator,
    metrics: Arc<PipelineMetrics>,
    scorer_timeout: Duration,
}

impl InferenceOrchestrator {
    /// Wire up the pipeline. The registry, store, and metrics are shared
    /// with the surrounding service; everything else is owned here and torn
    /// down with the orchestrator.
    pub fn new(
        config: &AppConfig,
        registry: Arc<ModelRegistry>,
        store: Arc<PredictionStore>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            featurizer: SessionFeaturizer::new(config.models.sequence_window),
            fuser: EnsembleFuser::new(&config.ensemble),
            post_filter: PostFilter::new(&config.post_filter),
            cache: VerdictCache::new(Duration::from_secs(config.cache.ttl_secs)),
            rate_limiter: RateLimiter::new(&config.rate_limit),
            stats: StatisticsAggregator::new(Arc::clone(&store)),
            scorer_timeout: Duration::from_millis(config.models.scorer_timeout_ms),
            registry,
            store,
            metrics,
        }
    }

    /// Score one session for one client.
    pub async fn score_session(
        &self,
        session: &Session,
        client_id: &str,
    ) -> Result<VerdictResponse, PipelineError> {
        let started = Instant::now();

        if let Err(err) = self.rate_limiter.admit(client_id) {
            self.metrics.record_rate_limited();
            warn!(client_id = %client_id, "Request rejected by rate limiter");
            return Err(err);
        }

        let fingerprint = session.fingerprint();

        if let Some(verdict) = self.cache.get(fingerprint.as_str()).await {
            return Ok(self.cached_response(session, verdict, started));
        }

        // Serialize concurrent misses on this fingerprint so the models run
        // at most once per unique session content.
        let guard = self.cache.compute_guard(fingerprint.as_str()).await;
        let held = guard.lock().await;

        if let Some(verdict) = self.cache.get(fingerprint.as_str()).await {
            drop(held);
            return Ok(self.cached_response(session, verdict, started));
        }
        self.metrics.record_cache_miss();

        let outcome = self.compute_verdict(session, &fingerprint, started).await;

        drop(held);
        self.cache.release_guard(fingerprint.as_str()).await;

        let verdict = outcome?;
        debug!(
            session_id = %session.session_id,
            fused_score = verdict.fused_score,
            is_alert = verdict.is_alert,
            latency_us = started.elapsed().as_micros() as u64,
            "Session scored"
        );

        Ok(VerdictResponse {
            session_id: session.session_id.clone(),
            verdict,
            cached: false,
            latency_us: started.elapsed().as_micros() as u64,
        })
    }

    fn cached_response(
        &self,
        session: &Session,
        verdict: Verdict,
        started: Instant,
    ) -> VerdictResponse {
        self.metrics.record_cache_hit();
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
        debug!(session_id = %session.session_id, "Verdict served from cache");
        VerdictResponse {
            session_id: session.session_id.clone(),
            verdict,
            cached: true,
            latency_us: started.elapsed().as_micros() as u64,
        }
    }

    async fn compute_verdict(
        &self,
        session: &Session,
        fingerprint: &Fingerprint,
        started: Instant,
    ) -> Result<Verdict, PipelineError> {
        let (features, tensor) = self.featurizer.featurize(session)?;

        // Pin one model version for the whole request; a concurrent swap
        // never mixes versions within a request.
        let version = self.registry.active()?;

        let (xgb_score, lstm_score) = self.run_models(&version, features, tensor).await?;

        let fused = self.fuser.fuse(xgb_score, lstm_score)?;

        let verdict = self.post_filter.apply(
            session,
            Verdict {
                fused_score: fused.fused_score,
                xgb_score,
                lstm_score,
                confidence: fused.confidence,
                is_alert: fused.is_alert,
                filtered: false,
                reason: None,
                model_version: version.version_id.clone(),
                computed_at: Utc::now(),
            },
        );

        if verdict.filtered {
            self.metrics.record_filtered();
        }
        if verdict.is_alert {
            self.metrics.record_alert();
        }

        // Persist off the response path; a failed write is counted and
        // logged but the caller still gets the verdict.
        let record = PredictionRecord::from_verdict(
            session,
            fingerprint,
            &verdict,
            started.elapsed().as_micros() as u64,
        );
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        tokio::task::spawn_blocking(move || {
            if let Err(err) = store.append(&record) {
                metrics.record_persistence_failure();
                error!(record_id = %record.id, error = %err, "Failed to persist prediction");
            }
        });

        // Populate the cache before responding so guard waiters reuse it
        self.cache.put(fingerprint.as_str(), verdict.clone()).await;

        self.metrics
            .record_request(started.elapsed(), verdict.fused_score);

        Ok(verdict)
    }

    /// Run both scorers concurrently, each bounded by the configured
    /// deadline. A timeout surfaces as a model-unavailable failure; the
    /// caller decides whether to retry.
    async fn run_models(
        &self,
        version: &Arc<ModelVersion>,
        features: FeatureVector,
        tensor: SequenceTensor,
    ) -> Result<(f64, f64), PipelineError> {
        let tree = Arc::clone(&version.tree);
        let tree_metrics = Arc::clone(&self.metrics);
        let timeout = self.scorer_timeout;
        let tree_task = async move {
            let started = Instant::now();
            let result = tokio::time::timeout(
                timeout,
                tokio::task::spawn_blocking(move || tree.score(&features)),
            )
            .await;
            tree_metrics.record_model_time("xgboost", started.elapsed());
            resolve_model_result(result, "xgboost")
        };

        let sequence = Arc::clone(&version.sequence);
        let sequence_metrics = Arc::clone(&self.metrics);
        let sequence_task = async move {
            let started = Instant::now();
            let result = tokio::time::timeout(
                timeout,
                tokio::task::spawn_blocking(move || sequence.score(&tensor)),
            )
            .await;
            sequence_metrics.record_model_time("lstm", started.elapsed());
            resolve_model_result(result, "lstm")
        };

        let (xgb_score, lstm_score) = tokio::join!(tree_task, sequence_task);
        Ok((xgb_score?, lstm_score?))
    }

    /// Rolling statistics derived from the prediction store.
    pub fn statistics(&self) -> Result<StatisticsSnapshot, PipelineError> {
        self.stats.snapshot()
    }

    /// Summary of the active model version; fails closed when none is loaded.
    pub fn model_info(&self) -> Result<ModelVersionInfo, PipelineError> {
        self.registry
            .info()
            .ok_or_else(|| PipelineError::ModelUnavailable("no active model version".to_string()))
    }

    pub async fn health(&self) -> HealthSummary {
        let info = self.registry.info();
        HealthSummary {
            model_loaded: info.is_some(),
            version_id: info.map(|i| i.version_id),
            cache_entries: self.cache.len().await,
            cache_ttl_secs: self.cache.ttl().as_secs(),
            predictions_stored: self.store.aggregate().map(|a| a.total).unwrap_or(0),
        }
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Shared registry handle, for version hot-swap from the control surface.
    pub fn registry(&self) -> Arc<ModelRegistry> {
        Arc::clone(&self.registry)
    }
}

fn resolve_model_result(
    result: Result<
        Result<Result<f64, PipelineError>, tokio::task::JoinError>,
        tokio::time::error::Elapsed,
    >,
    model: &str,
) -> Result<f64, PipelineError> {
    match result {
        Err(_) => Err(PipelineError::ModelUnavailable(format!(
            "{model} scoring timed out"
        ))),
        Ok(Err(join_err)) => Err(PipelineError::ModelUnavailable(format!(
            "{model} scoring task failed: {join_err}"
        ))),
        Ok(Ok(inner)) => inner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scorer::{SequenceModel, TreeModel};
    use crate::types::event::Event;
    use chrono::{DateTime, TimeZone};

    struct FixedTree(f64);
    impl TreeModel for FixedTree {
        fn score(&self, _features: &[f32]) -> Result<f64, PipelineError> {
            Ok(self.0)
        }
    }

    struct FixedSequence(f64);
    impl SequenceModel for FixedSequence {
        fn score(&self, _tensor: &SequenceTensor) -> Result<f64, PipelineError> {
            Ok(self.0)
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn orchestrator_with_scores(xgb: f64, lstm: f64) -> InferenceOrchestrator {
        let registry = Arc::new(ModelRegistry::with_active(ModelVersion::new(
            "v1",
            "models/xgboost.onnx",
            "models/lstm.onnx",
            Arc::new(FixedTree(xgb)),
            Arc::new(FixedSequence(lstm)),
        )));
        let store = Arc::new(PredictionStore::open_in_memory().unwrap());
        InferenceOrchestrator::new(
            &AppConfig::default(),
            registry,
            store,
            Arc::new(PipelineMetrics::new()),
        )
    }

    fn long_session() -> Session {
        let events: Vec<Event> = (0..20)
            .map(|i| Event::new(ts(i * 60), "alice", "file_access", "10.0.0.5"))
            .collect();
        Session::new("s-long", "alice", events)
    }

    #[tokio::test]
    async fn test_scores_and_fuses() {
        let orchestrator = orchestrator_with_scores(0.9, 0.7);

        let response = orchestrator
            .score_session(&long_session(), "client-1")
            .await
            .unwrap();

        assert!((response.verdict.fused_score - 0.82).abs() < 1e-12);
        assert!(response.verdict.is_alert);
        assert!(!response.cached);
        assert_eq!(response.verdict.model_version, "v1");
    }

    #[tokio::test]
    async fn test_second_identical_request_is_cached() {
        let orchestrator = orchestrator_with_scores(0.9, 0.7);
        let session = long_session();

        let first = orchestrator.score_session(&session, "client-1").await.unwrap();
        let second = orchestrator.score_session(&session, "client-1").await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.verdict.fused_score, second.verdict.fused_score);
    }

    #[tokio::test]
    async fn test_no_active_version_fails_closed() {
        let registry = Arc::new(ModelRegistry::empty());
        let store = Arc::new(PredictionStore::open_in_memory().unwrap());
        let orchestrator = InferenceOrchestrator::new(
            &AppConfig::default(),
            registry,
            store,
            Arc::new(PipelineMetrics::new()),
        );

        let err = orchestrator
            .score_session(&long_session(), "client-1")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable(_)));
        assert!(orchestrator.model_info().is_err());
    }

    #[tokio::test]
    async fn test_empty_session_rejected_before_scoring() {
        let orchestrator = orchestrator_with_scores(0.9, 0.7);
        let session = Session::new("s-empty", "alice", vec![]);

        let err = orchestrator
            .score_session(&session, "client-1")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptySession));
    }

    #[tokio::test]
    async fn test_anomalous_score_fails_loudly() {
        let orchestrator = orchestrator_with_scores(f64::NAN, 0.7);

        let err = orchestrator
            .score_session(&long_session(), "client-1")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ScoringAnomaly(_)));
    }

    #[tokio::test]
    async fn test_health_summary() {
        let orchestrator = orchestrator_with_scores(0.2, 0.2);

        let health = orchestrator.health().await;
        assert!(health.model_loaded);
        assert_eq!(health.version_id.as_deref(), Some("v1"));
        assert_eq!(health.cache_ttl_secs, 300);
    }
}
