//! NATS message producer for threat alerts

use crate::types::verdict::VerdictResponse;
use anyhow::Result;
use async_nats::Client;
use tracing::debug;

/// Producer for publishing alert verdicts to NATS
#[derive(Clone)]
pub struct AlertProducer {
    client: Client,
    subject: String,
}

impl AlertProducer {
    /// Create a new alert producer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish an alert verdict
    pub async fn publish(&self, response: &VerdictResponse) -> Result<()> {
        let payload = serde_json::to_vec(response)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            session_id = %response.session_id,
            fused_score = response.verdict.fused_score,
            "Published threat alert"
        );

        Ok(())
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running NATS server
}
