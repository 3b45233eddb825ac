//! Session and event data structures for insider threat scoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hard ceiling on events per session. The validation layer upstream rejects
/// longer sessions; the featurizer still truncates defensively to the most
/// recent events if one slips through.
pub const MAX_SESSION_EVENTS: usize = 10_000;

/// A single user activity event (login, file access, transfer, ...).
///
/// Immutable once ingested. Attributes use a BTreeMap so that iteration
/// order, and therefore the session fingerprint, is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event timestamp; must be non-decreasing within a session
    pub timestamp: DateTime<Utc>,

    /// Acting user identity
    pub user_id: String,

    /// Action name, e.g. "login", "file_download", "auth_failure"
    pub action: String,

    /// Source IP the action originated from
    pub source_ip: String,

    /// Free-form attributes, e.g. resource path or "sensitive" marker
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Event {
    /// Create a new event with empty attributes.
    pub fn new(
        timestamp: DateTime<Utc>,
        user_id: impl Into<String>,
        action: impl Into<String>,
        source_ip: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            user_id: user_id.into(),
            action: action.into(),
            source_ip: source_ip.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach an attribute, builder-style.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// An ordered sequence of events attributed to one actor and time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Caller-supplied or derived session key
    pub session_id: String,

    /// Actor the session belongs to
    pub user_id: String,

    /// Events ordered by timestamp
    pub events: Vec<Event>,
}

impl Session {
    /// Create a session from pre-ordered events.
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        events: Vec<Event>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            events,
        }
    }

    /// Whether event timestamps are non-decreasing.
    pub fn is_ordered(&self) -> bool {
        self.events
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }

    /// Wall-clock span from first to last event. Zero for single-event sessions.
    pub fn duration(&self) -> chrono::Duration {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => chrono::Duration::zero(),
        }
    }

    /// The action names in event order.
    pub fn action_sequence(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.action.as_str()).collect()
    }

    /// Content-derived fingerprint used as the cache key.
    ///
    /// Derived from event content only, never from the session key or
    /// receipt time: two sessions with identical events must collide.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        for event in &self.events {
            hasher.update(event.timestamp.timestamp_millis().to_le_bytes());
            hasher.update(event.user_id.as_bytes());
            hasher.update([0x1f]);
            hasher.update(event.action.as_bytes());
            hasher.update([0x1f]);
            hasher.update(event.source_ip.as_bytes());
            for (key, value) in &event.attributes {
                hasher.update([0x1f]);
                hasher.update(key.as_bytes());
                hasher.update([0x1e]);
                hasher.update(value.as_bytes());
            }
            hasher.update([0x1d]);
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

/// Stable content hash of a session, used as the verdict cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sample_events() -> Vec<Event> {
        vec![
            Event::new(ts(0), "alice", "login", "10.0.0.5"),
            Event::new(ts(30), "alice", "file_access", "10.0.0.5")
                .with_attribute("path", "/srv/reports/q3.xlsx"),
            Event::new(ts(90), "alice", "logout", "10.0.0.5"),
        ]
    }

    #[test]
    fn test_session_serialization() {
        let session = Session::new("s-1", "alice", sample_events());

        let json = serde_json::to_string(&session).unwrap();
        let deserialized: Session = serde_json::from_str(&json).unwrap();

        assert_eq!(session.session_id, deserialized.session_id);
        assert_eq!(session.events.len(), deserialized.events.len());
        assert_eq!(session.events[1].attributes, deserialized.events[1].attributes);
    }

    #[test]
    fn test_ordering_check() {
        let session = Session::new("s-1", "alice", sample_events());
        assert!(session.is_ordered());

        let mut events = sample_events();
        events.swap(0, 2);
        let unordered = Session::new("s-2", "alice", events);
        assert!(!unordered.is_ordered());
    }

    #[test]
    fn test_fingerprint_ignores_session_key() {
        let a = Session::new("s-1", "alice", sample_events());
        let b = Session::new("totally-different-key", "alice", sample_events());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_sensitive_to_content() {
        let a = Session::new("s-1", "alice", sample_events());

        let mut events = sample_events();
        events[1].action = "file_download".to_string();
        let b = Session::new("s-1", "alice", events);

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_duration() {
        let session = Session::new("s-1", "alice", sample_events());
        assert_eq!(session.duration().num_seconds(), 90);

        let single = Session::new(
            "s-2",
            "alice",
            vec![Event::new(ts(0), "alice", "login", "10.0.0.5")],
        );
        assert_eq!(single.duration().num_seconds(), 0);
    }
}
