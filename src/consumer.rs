//! NATS message consumer for incoming session envelopes

use crate::types::event::Session;
use anyhow::Result;
use async_nats::{Client, Subscriber};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Wire envelope pairing a session with the submitting client identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub client_id: String,
    pub session: Session,
}

/// Consumer for receiving session envelopes from NATS
pub struct SessionConsumer {
    client: Client,
    subject: String,
}

impl SessionConsumer {
    /// Create a new session consumer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the session subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to session subject");
        Ok(subscriber)
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::event::Event;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_envelope_round_trip() {
        let envelope = SessionEnvelope {
            client_id: "soc-console".to_string(),
            session: Session::new(
                "s-1",
                "alice",
                vec![Event::new(
                    Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                    "alice",
                    "login",
                    "10.0.0.5",
                )],
            ),
        };

        let json = serde_json::to_vec(&envelope).unwrap();
        let parsed: SessionEnvelope = serde_json::from_slice(&json).unwrap();

        assert_eq!(parsed.client_id, "soc-console");
        assert_eq!(parsed.session.session_id, "s-1");
    }
}
