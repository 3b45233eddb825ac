//! Verdict and prediction record data structures

use crate::types::event::{Fingerprint, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final scoring decision for one session.
///
/// Created once per unique uncached session and immutable thereafter;
/// cached copies are read-only views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Weighted combination of the two model scores, in [0, 1]
    pub fused_score: f64,

    /// Gradient-boosted tree model score
    pub xgb_score: f64,

    /// Sequence model score
    pub lstm_score: f64,

    /// Distance of the fused score from the decision boundary, in [0, 1]
    pub confidence: f64,

    /// Whether the fused score crossed the alert threshold
    pub is_alert: bool,

    /// Whether a post-filter rule demoted this verdict
    pub filtered: bool,

    /// Name of the post-filter rule that fired, if any
    pub reason: Option<String>,

    /// Model version that produced the scores
    pub model_version: String,

    /// When the verdict was computed
    pub computed_at: DateTime<Utc>,
}

/// Response returned to the framing layer for one scoring request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictResponse {
    pub session_id: String,
    pub verdict: Verdict,
    /// Whether the verdict was served from the cache
    pub cached: bool,
    /// End-to-end request latency in microseconds
    pub latency_us: u64,
}

/// Persisted projection of a verdict, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub fingerprint: String,
    pub fused_score: f64,
    pub xgb_score: f64,
    pub lstm_score: f64,
    pub is_alert: bool,
    pub filtered: bool,
    pub reason: Option<String>,
    pub model_version: String,
    pub latency_us: u64,
    pub computed_at: DateTime<Utc>,
}

impl PredictionRecord {
    /// Build a record from a freshly computed verdict.
    pub fn from_verdict(
        session: &Session,
        fingerprint: &Fingerprint,
        verdict: &Verdict,
        latency_us: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            fingerprint: fingerprint.as_str().to_string(),
            fused_score: verdict.fused_score,
            xgb_score: verdict.xgb_score,
            lstm_score: verdict.lstm_score,
            is_alert: verdict.is_alert,
            filtered: verdict.filtered,
            reason: verdict.reason.clone(),
            model_version: verdict.model_version.clone(),
            latency_us,
            computed_at: verdict.computed_at,
        }
    }
}

/// Rolling statistics derived from the prediction store, recomputed on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total_requests: u64,
    pub alert_rate: f64,
    pub requests_per_min: u64,
    pub uptime_seconds: u64,
}

/// Summary of the active model version. Carries no throughput data;
/// the statistics aggregator is the sole authority for rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersionInfo {
    pub version_id: String,
    pub loaded_at: DateTime<Utc>,
    pub xgb_artifact: String,
    pub lstm_artifact: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::event::Event;
    use chrono::TimeZone;

    fn sample_verdict() -> Verdict {
        Verdict {
            fused_score: 0.82,
            xgb_score: 0.9,
            lstm_score: 0.7,
            confidence: 0.64,
            is_alert: true,
            filtered: false,
            reason: None,
            model_version: "v1".to_string(),
            computed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_verdict_serialization() {
        let verdict = sample_verdict();

        let json = serde_json::to_string(&verdict).unwrap();
        let deserialized: Verdict = serde_json::from_str(&json).unwrap();

        assert_eq!(verdict.fused_score, deserialized.fused_score);
        assert_eq!(verdict.is_alert, deserialized.is_alert);
        assert_eq!(verdict.reason, deserialized.reason);
    }

    #[test]
    fn test_prediction_record_from_verdict() {
        let session = Session::new(
            "s-1",
            "alice",
            vec![Event::new(
                Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                "alice",
                "login",
                "10.0.0.5",
            )],
        );
        let fingerprint = session.fingerprint();
        let verdict = sample_verdict();

        let record = PredictionRecord::from_verdict(&session, &fingerprint, &verdict, 1234);

        assert_eq!(record.session_id, "s-1");
        assert_eq!(record.user_id, "alice");
        assert_eq!(record.fingerprint, fingerprint.as_str());
        assert_eq!(record.fused_score, verdict.fused_score);
        assert_eq!(record.latency_us, 1234);
        assert!(!record.id.is_empty());
    }
}
