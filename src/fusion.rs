//! Weighted fusion of the two model scores into one decision.

use crate::config::EnsembleConfig;
use crate::error::PipelineError;

/// Fused score plus the threshold decision derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedScore {
    pub fused_score: f64,
    pub is_alert: bool,
    /// Distance from the decision boundary, scaled to [0, 1]
    pub confidence: f64,
}

/// Combines tree and sequence model probabilities with fixed weights.
///
/// Weights and threshold are injected configuration; the same code serves
/// deployments with different tunings.
pub struct EnsembleFuser {
    xgb_weight: f64,
    lstm_weight: f64,
    threshold: f64,
}

impl EnsembleFuser {
    pub fn new(config: &EnsembleConfig) -> Self {
        Self {
            xgb_weight: config.xgb_weight,
            lstm_weight: config.lstm_weight,
            threshold: config.threshold,
        }
    }

    /// Fuse two sub-scores into a decision.
    ///
    /// A NaN or out-of-range sub-score is a data integrity signal and fails
    /// with a scoring anomaly; it is never clamped into range.
    pub fn fuse(&self, xgb_score: f64, lstm_score: f64) -> Result<FusedScore, PipelineError> {
        check_probability(xgb_score, "xgb")?;
        check_probability(lstm_score, "lstm")?;

        let fused_score = self.xgb_weight * xgb_score + self.lstm_weight * lstm_score;

        Ok(FusedScore {
            fused_score,
            is_alert: fused_score >= self.threshold,
            confidence: (fused_score - 0.5).abs() * 2.0,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

fn check_probability(score: f64, model: &str) -> Result<(), PipelineError> {
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(PipelineError::ScoringAnomaly(format!(
            "{model} score {score} outside [0, 1]"
        )));
    }
    Ok(())
}
