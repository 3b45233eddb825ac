//! Session feature extraction for model inference.
//!
//! Turns an ordered event sequence into the two model inputs: a fixed-width
//! numeric vector for the tree model and a length-normalized tensor for the
//! sequence model. Extraction is pure and deterministic; identical event
//! content always yields bit-identical outputs.

use crate::error::PipelineError;
use crate::types::event::{Event, Session, MAX_SESSION_EVENTS};

/// Fixed-width numeric encoding of a session.
pub type FeatureVector = Vec<f32>;

/// Actions the models were trained on, in vocabulary order.
/// Unknown actions map to one index past the end.
pub const ACTION_VOCAB: [&str; 10] = [
    "login",
    "logout",
    "file_access",
    "file_download",
    "file_upload",
    "file_delete",
    "email_sent",
    "usb_insert",
    "http_request",
    "auth_failure",
];

/// Number of features in the tree model input.
pub const FEATURE_COUNT: usize = 12 + ACTION_VOCAB.len();

/// Per-event channels in the sequence tensor.
pub const SEQUENCE_CHANNELS: usize = 3;

/// Inter-event gaps are capped so one overnight pause does not dominate.
const MAX_GAP_SECS: f32 = 3600.0;

/// Time-ordered, length-normalized input for the sequence model.
///
/// Row layout per event: action vocabulary index (1-based), inter-event gap
/// in seconds (capped), hour of day scaled to [0, 1]. Sessions shorter than
/// the window are pre-padded with all-zero sentinel rows; the 1-based action
/// vocabulary keeps zero unambiguous as padding.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceTensor {
    pub window: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl SequenceTensor {
    /// ONNX input shape: [batch, window, channels].
    pub fn shape(&self) -> [i64; 3] {
        [1, self.window as i64, self.channels as i64]
    }
}

/// Extracts model inputs from sessions.
pub struct SessionFeaturizer {
    sequence_window: usize,
}

impl SessionFeaturizer {
    pub fn new(sequence_window: usize) -> Self {
        Self { sequence_window }
    }

    /// Extract both model inputs from a session.
    ///
    /// Requires a non-empty session with pre-sorted events; unordered input
    /// is rejected rather than re-sorted. Over-long sessions are truncated
    /// to the most recent events.
    pub fn featurize(
        &self,
        session: &Session,
    ) -> Result<(FeatureVector, SequenceTensor), PipelineError> {
        if session.events.is_empty() {
            return Err(PipelineError::EmptySession);
        }
        if !session.is_ordered() {
            return Err(PipelineError::UnorderedEvents);
        }

        let events = if session.events.len() > MAX_SESSION_EVENTS {
            &session.events[session.events.len() - MAX_SESSION_EVENTS..]
        } else {
            &session.events[..]
        };

        Ok((self.feature_vector(events), self.sequence_tensor(events)))
    }

    fn feature_vector(&self, events: &[Event]) -> FeatureVector {
        let mut features = Vec::with_capacity(FEATURE_COUNT);
        let count = events.len() as f32;

        let unique_actions = {
            let mut actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
            actions.sort_unstable();
            actions.dedup();
            actions.len() as f32
        };
        let unique_ips = {
            let mut ips: Vec<&str> = events.iter().map(|e| e.source_ip.as_str()).collect();
            ips.sort_unstable();
            ips.dedup();
            ips.len() as f32
        };

        let duration_secs = (events.last().unwrap().timestamp - events[0].timestamp)
            .num_milliseconds() as f32
            / 1000.0;

        let gaps: Vec<f32> = events
            .windows(2)
            .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f32 / 1000.0)
            .collect();

        let (mean_gap, std_gap, min_gap, max_gap, burst_ratio) = if gaps.is_empty() {
            (0.0, 0.0, 0.0, 0.0, 0.0)
        } else {
            let mean = gaps.iter().sum::<f32>() / gaps.len() as f32;
            let variance =
                gaps.iter().map(|g| (g - mean).powi(2)).sum::<f32>() / gaps.len() as f32;
            let min = gaps.iter().copied().fold(f32::INFINITY, f32::min);
            let max = gaps.iter().copied().fold(0.0, f32::max);
            let bursts = gaps.iter().filter(|&&g| g < 1.0).count() as f32 / gaps.len() as f32;
            (mean, variance.sqrt(), min, max, bursts)
        };

        let events_per_minute = count / (duration_secs.max(1.0) / 60.0);

        let off_hours = events
            .iter()
            .filter(|e| {
                let hour = e.timestamp.format("%H").to_string().parse::<u32>().unwrap_or(12);
                !(8..18).contains(&hour)
            })
            .count() as f32
            / count;

        let sensitive_ratio = events
            .iter()
            .filter(|e| e.attributes.get("sensitive").map(String::as_str) == Some("true"))
            .count() as f32
            / count;

        features.push(count);
        features.push(unique_actions);
        features.push(unique_ips);
        features.push(duration_secs);
        features.push(events_per_minute);
        features.push(mean_gap);
        features.push(std_gap);
        features.push(min_gap);
        features.push(max_gap);
        features.push(burst_ratio);
        features.push(off_hours);
        features.push(sensitive_ratio);

        // Per-action ratios in vocabulary order
        for action in ACTION_VOCAB {
            let ratio = events.iter().filter(|e| e.action == action).count() as f32 / count;
            features.push(ratio);
        }

        features
    }

    fn sequence_tensor(&self, events: &[Event]) -> SequenceTensor {
        let window = self.sequence_window;
        let recent = if events.len() > window {
            &events[events.len() - window..]
        } else {
            events
        };

        let mut data = vec![0.0f32; window * SEQUENCE_CHANNELS];
        let pad_rows = window - recent.len();

        for (i, event) in recent.iter().enumerate() {
            let row = (pad_rows + i) * SEQUENCE_CHANNELS;

            data[row] = action_index(&event.action) as f32;

            data[row + 1] = if i == 0 {
                0.0
            } else {
                let gap = (event.timestamp - recent[i - 1].timestamp).num_milliseconds() as f32
                    / 1000.0;
                gap.min(MAX_GAP_SECS)
            };

            let hour = event
                .timestamp
                .format("%H")
                .to_string()
                .parse::<u32>()
                .unwrap_or(12);
            data[row + 2] = hour as f32 / 23.0;
        }

        SequenceTensor {
            window,
            channels: SEQUENCE_CHANNELS,
            data,
        }
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names, matching extraction order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        let mut names = vec![
            "event_count",
            "unique_actions",
            "unique_source_ips",
            "duration_secs",
            "events_per_minute",
            "mean_gap_secs",
            "std_gap_secs",
            "min_gap_secs",
            "max_gap_secs",
            "burst_ratio",
            "off_hours_ratio",
            "sensitive_ratio",
        ];
        names.extend(ACTION_VOCAB);
        names
    }
}

/// 1-based vocabulary index; unknown actions map past the end.
fn action_index(action: &str) -> usize {
    ACTION_VOCAB
        .iter()
        .position(|&a| a == action)
        .map(|i| i + 1)
        .unwrap_or(ACTION_VOCAB.len() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn session(events: Vec<Event>) -> Session {
        Session::new("s-1", "alice", events)
    }

    fn typical_session() -> Session {
        session(vec![
            Event::new(ts(0), "alice", "login", "10.0.0.5"),
            Event::new(ts(30), "alice", "file_access", "10.0.0.5"),
            Event::new(ts(95), "alice", "file_download", "10.0.0.5")
                .with_attribute("sensitive", "true"),
            Event::new(ts(120), "alice", "logout", "10.0.0.5"),
        ])
    }

    #[test]
    fn test_feature_vector_shape_and_basics() {
        let featurizer = SessionFeaturizer::new(50);
        let (features, tensor) = featurizer.featurize(&typical_session()).unwrap();

        assert_eq!(features.len(), featurizer.feature_count());
        assert_eq!(features.len(), featurizer.feature_names().len());
        assert_eq!(features[0], 4.0); // event_count
        assert_eq!(features[1], 4.0); // unique_actions
        assert_eq!(features[2], 1.0); // unique_source_ips
        assert_eq!(features[3], 120.0); // duration_secs
        assert_eq!(features[11], 0.25); // sensitive_ratio

        assert_eq!(tensor.data.len(), 50 * SEQUENCE_CHANNELS);
        assert_eq!(tensor.shape(), [1, 50, 3]);
    }

    #[test]
    fn test_determinism() {
        let featurizer = SessionFeaturizer::new(50);
        let s = typical_session();

        let (f1, t1) = featurizer.featurize(&s).unwrap();
        let (f2, t2) = featurizer.featurize(&s).unwrap();

        assert_eq!(f1, f2);
        assert_eq!(t1, t2);
    }

    #[test]
    fn test_empty_session_rejected() {
        let featurizer = SessionFeaturizer::new(50);
        let err = featurizer.featurize(&session(vec![])).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySession));
    }

    #[test]
    fn test_unordered_session_rejected() {
        let featurizer = SessionFeaturizer::new(50);
        let s = session(vec![
            Event::new(ts(60), "alice", "login", "10.0.0.5"),
            Event::new(ts(0), "alice", "logout", "10.0.0.5"),
        ]);
        let err = featurizer.featurize(&s).unwrap_err();
        assert!(matches!(err, PipelineError::UnorderedEvents));
    }

    #[test]
    fn test_sequence_padding_keeps_recent_events_last() {
        let featurizer = SessionFeaturizer::new(5);
        let s = session(vec![
            Event::new(ts(0), "alice", "login", "10.0.0.5"),
            Event::new(ts(10), "alice", "logout", "10.0.0.5"),
        ]);
        let (_, tensor) = featurizer.featurize(&s).unwrap();

        // Three sentinel rows, then login (index 1) and logout (index 2)
        assert_eq!(&tensor.data[0..9], &[0.0; 9]);
        assert_eq!(tensor.data[3 * SEQUENCE_CHANNELS], 1.0);
        assert_eq!(tensor.data[4 * SEQUENCE_CHANNELS], 2.0);
        assert_eq!(tensor.data[4 * SEQUENCE_CHANNELS + 1], 10.0);
    }

    #[test]
    fn test_sequence_truncation_keeps_most_recent() {
        let featurizer = SessionFeaturizer::new(3);
        let events: Vec<Event> = (0..10)
            .map(|i| {
                let action = if i == 9 { "auth_failure" } else { "file_access" };
                Event::new(ts(i * 10), "alice", action, "10.0.0.5")
            })
            .collect();
        let (_, tensor) = featurizer.featurize(&session(events)).unwrap();

        // Last row must be the final event of the session
        let last_row = (tensor.window - 1) * SEQUENCE_CHANNELS;
        assert_eq!(tensor.data[last_row], action_index("auth_failure") as f32);
    }

    #[test]
    fn test_unknown_action_maps_past_vocabulary() {
        assert_eq!(action_index("login"), 1);
        assert_eq!(action_index("auth_failure"), ACTION_VOCAB.len());
        assert_eq!(action_index("never_seen"), ACTION_VOCAB.len() + 1);
    }

    #[test]
    fn test_oversized_session_truncated_defensively() {
        let featurizer = SessionFeaturizer::new(10);
        let events: Vec<Event> = (0..(MAX_SESSION_EVENTS as i64 + 50))
            .map(|i| Event::new(ts(i), "alice", "http_request", "10.0.0.5"))
            .collect();
        let (features, _) = featurizer.featurize(&session(events)).unwrap();

        assert_eq!(features[0], MAX_SESSION_EVENTS as f32);
        // Duration covers only the kept tail
        assert_eq!(features[3], (MAX_SESSION_EVENTS - 1) as f32);
    }

    #[test]
    fn test_single_event_session() {
        let featurizer = SessionFeaturizer::new(50);
        let s = session(vec![Event::new(ts(0), "alice", "login", "10.0.0.5")]);
        let (features, _) = featurizer.featurize(&s).unwrap();

        assert_eq!(features[0], 1.0);
        assert_eq!(features[3], 0.0); // duration
        assert_eq!(features[5], 0.0); // mean gap
    }
}
