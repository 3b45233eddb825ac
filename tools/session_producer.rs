//! Test Session Producer
//!
//! Generates and publishes test session envelopes to NATS for pipeline testing.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Event structure matching the pipeline's expected format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Event {
    timestamp: DateTime<Utc>,
    user_id: String,
    action: String,
    source_ip: String,
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Session {
    session_id: String,
    user_id: String,
    events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionEnvelope {
    client_id: String,
    session: Session,
}

/// Session generator for testing
struct SessionGenerator {
    rng: rand::rngs::ThreadRng,
    session_counter: u64,
}

impl SessionGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            session_counter: 0,
        }
    }

    fn event(
        &mut self,
        timestamp: DateTime<Utc>,
        user_id: &str,
        action: &str,
        source_ip: &str,
    ) -> Event {
        Event {
            timestamp,
            user_id: user_id.to_string(),
            action: action.to_string(),
            source_ip: source_ip.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    /// Generate a benign daytime work session
    fn generate_benign(&mut self) -> Session {
        self.session_counter += 1;
        let user = format!("user_{:03}", self.rng.gen_range(1..50));
        let ip = format!("10.0.{}.{}", self.rng.gen_range(0..8), self.rng.gen_range(2..255));
        let start = Utc::now() - Duration::hours(self.rng.gen_range(1..4));

        let mut events = vec![self.event(start, &user, "login", &ip)];
        let mut cursor = start;
        for _ in 0..self.rng.gen_range(3..15) {
            cursor += Duration::seconds(self.rng.gen_range(30..600));
            let action = ["file_access", "email_sent", "http_request"]
                [self.rng.gen_range(0..3)];
            events.push(self.event(cursor, &user, action, &ip));
        }
        cursor += Duration::seconds(self.rng.gen_range(30..300));
        events.push(self.event(cursor, &user, "logout", &ip));

        Session {
            session_id: format!("session_{:012}", self.session_counter),
            user_id: user,
            events,
        }
    }

    /// Generate a suspicious night-time exfiltration session
    fn generate_suspicious(&mut self) -> Session {
        self.session_counter += 1;
        let user = format!("user_{:03}", self.rng.gen_range(1..50));
        let ip = format!(
            "198.51.100.{}", // external address
            self.rng.gen_range(2..255)
        );
        // Night-time start, bulk downloads in rapid succession
        let start = Utc::now() - Duration::hours(self.rng.gen_range(20..28));

        let mut events = vec![
            self.event(start, &user, "auth_failure", &ip),
            self.event(start + Duration::seconds(10), &user, "auth_failure", &ip),
            self.event(start + Duration::seconds(25), &user, "login", &ip),
        ];
        let mut cursor = start + Duration::seconds(30);
        for i in 0..self.rng.gen_range(20..60) {
            cursor += Duration::seconds(self.rng.gen_range(1..15));
            let mut event = self.event(cursor, &user, "file_download", &ip);
            event
                .attributes
                .insert("path".to_string(), format!("/srv/finance/ledger_{i}.xlsx"));
            event
                .attributes
                .insert("sensitive".to_string(), "true".to_string());
            events.push(event);
        }
        cursor += Duration::seconds(5);
        events.push(self.event(cursor, &user, "usb_insert", &ip));

        Session {
            session_id: format!("session_{:012}", self.session_counter),
            user_id: user,
            events,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("session_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Session Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("sessions");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let suspicious_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        suspicious_rate = suspicious_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    // Connect to NATS
    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, suspicious_rate, delay_ms).await;
        }
    };

    // Generate and publish sessions
    let mut generator = SessionGenerator::new();
    let mut rng = rand::thread_rng();

    info!("Starting to publish {} sessions...", count);

    let mut benign_count = 0;
    let mut suspicious_count = 0;

    for i in 0..count {
        let session = if rng.gen_bool(suspicious_rate) {
            suspicious_count += 1;
            generator.generate_suspicious()
        } else {
            benign_count += 1;
            generator.generate_benign()
        };

        let envelope = SessionEnvelope {
            client_id: "session-producer".to_string(),
            session,
        };
        let payload = serde_json::to_vec(&envelope)?;

        client.publish(subject.to_string(), payload.into()).await?;

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} sessions ({} benign, {} suspicious)",
                i + 1,
                count,
                benign_count,
                suspicious_count
            );
        }

        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Published {} sessions ({} benign, {} suspicious)",
        count, benign_count, suspicious_count
    );

    Ok(())
}

async fn run_dry_mode(count: u64, suspicious_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = SessionGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let session = if rng.gen_bool(suspicious_rate) {
            generator.generate_suspicious()
        } else {
            generator.generate_benign()
        };

        let json = serde_json::to_string_pretty(&session)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample session {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
