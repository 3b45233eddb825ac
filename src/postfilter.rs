//! Heuristic demotion of verdicts matching known-benign session shapes.
//!
//! Rules are an ordered predicate table evaluated first-match-wins. A rule
//! only demotes the alert flag; the fused score itself is never altered, so
//! downstream consumers still see what the models produced.

use crate::config::PostFilterConfig;
use crate::types::event::Session;
use crate::types::verdict::Verdict;
use chrono::Duration;

const RULES: &[(&str, fn(&PostFilter, &Session) -> bool)] = &[
    ("single_action", PostFilter::is_single_action),
    ("short_duration", PostFilter::is_short_duration),
    ("benign_pattern", PostFilter::matches_benign_pattern),
];

pub struct PostFilter {
    min_duration: Duration,
    benign_patterns: Vec<Vec<String>>,
}

impl PostFilter {
    pub fn new(config: &PostFilterConfig) -> Self {
        Self {
            min_duration: Duration::seconds(config.min_duration_secs),
            benign_patterns: config.benign_patterns.clone(),
        }
    }

    /// Apply the rule table to a verdict.
    ///
    /// Idempotent: an already-filtered verdict passes through unchanged.
    /// A session matching no rule is returned unchanged.
    pub fn apply(&self, session: &Session, verdict: Verdict) -> Verdict {
        if verdict.filtered {
            return verdict;
        }

        for (reason, applies) in RULES {
            if applies(self, session) {
                return Verdict {
                    is_alert: false,
                    filtered: true,
                    reason: Some((*reason).to_string()),
                    ..verdict
                };
            }
        }

        verdict
    }

    fn is_single_action(&self, session: &Session) -> bool {
        session.events.len() == 1
    }

    fn is_short_duration(&self, session: &Session) -> bool {
        session.duration() < self.min_duration
    }

    fn matches_benign_pattern(&self, session: &Session) -> bool {
        let actions = session.action_sequence();
        self.benign_patterns.iter().any(|pattern| {
            actions.len() >= pattern.len()
                && actions
                    .iter()
                    .zip(pattern.iter())
                    .all(|(action, expected)| action == expected)
        })
    }
}
