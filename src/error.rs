//! Error taxonomy for the scoring pipeline.
//!
//! Every failure mode a caller can observe maps to one variant here.
//! Client-caused errors (bad input, rate limiting) are distinguishable from
//! operational ones (model unavailable, scoring anomaly) so the framing layer
//! can pick the right status without string matching.

use thiserror::Error;

/// Errors surfaced by the scoring pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Session contained no events.
    #[error("session contains no events")]
    EmptySession,

    /// Session events were not sorted by timestamp. Input must arrive
    /// pre-sorted; re-sorting here would hide upstream bugs.
    #[error("session events are not ordered by timestamp")]
    UnorderedEvents,

    /// Client exceeded its admission quota for the current window.
    #[error("rate limit exceeded for client {client_id}")]
    RateLimitExceeded { client_id: String },

    /// No active model version, a scorer failed, or a scoring call timed out.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// A model produced a NaN or out-of-range score. Surfaced loudly,
    /// never clamped.
    #[error("scoring anomaly: {0}")]
    ScoringAnomaly(String),

    /// Prediction store write or read failed. Never fails the response
    /// path; counted and logged instead.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl PipelineError {
    /// Stable machine-readable code for wire responses and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::EmptySession | PipelineError::UnorderedEvents => "invalid_session",
            PipelineError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            PipelineError::ModelUnavailable(_) => "model_unavailable",
            PipelineError::ScoringAnomaly(_) => "scoring_anomaly",
            PipelineError::Persistence(_) => "persistence_failure",
        }
    }

    /// Whether the client caused this error (fix the input, don't retry as-is).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptySession
                | PipelineError::UnorderedEvents
                | PipelineError::RateLimitExceeded { .. }
        )
    }

    /// Whether retrying the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimitExceeded { .. } | PipelineError::ModelUnavailable(_)
        )
    }
}
