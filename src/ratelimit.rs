//! Per-client admission control.
//!
//! Fixed window per client identity: the counter resets when the window
//! elapses. The limiter guards request volume, not compute volume, so a
//! cache hit still consumes an admission.

use crate::config::RateLimitConfig;
use crate::error::PipelineError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct ClientWindow {
    window_start: Instant,
    count: u32,
}

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    clients: Mutex<HashMap<String, ClientWindow>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request for a client.
    ///
    /// Denial is an explicit error so the caller can surface it; requests
    /// are never silently dropped.
    pub fn admit(&self, client_id: &str) -> Result<(), PipelineError> {
        let now = Instant::now();
        let mut clients = self.clients.lock().expect("rate limiter lock poisoned");

        let window = clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientWindow {
                window_start: now,
                count: 0,
            });

        if now.duration_since(window.window_start) >= self.window {
            window.window_start = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            return Err(PipelineError::RateLimitExceeded {
                client_id: client_id.to_string(),
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Admissions left for a client in its current window.
    pub fn remaining(&self, client_id: &str) -> u32 {
        let clients = self.clients.lock().expect("rate limiter lock poisoned");
        match clients.get(client_id) {
            Some(window) if window.window_start.elapsed() < self.window => {
                self.max_requests.saturating_sub(window.count)
            }
            _ => self.max_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            window_secs,
            max_requests,
        })
    }

    #[tokio::test]
    async fn test_quota_enforced() {
        let limiter = limiter(100, 60);

        for _ in 0..100 {
            limiter.admit("client-1").unwrap();
        }

        let err = limiter.admit("client-1").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RateLimitExceeded { ref client_id } if client_id == "client-1"
        ));
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = limiter(2, 60);

        limiter.admit("client-1").unwrap();
        limiter.admit("client-1").unwrap();
        assert!(limiter.admit("client-1").is_err());

        // Another client is unaffected
        limiter.admit("client-2").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_resumes_after_window() {
        let limiter = limiter(2, 60);

        limiter.admit("client-1").unwrap();
        limiter.admit("client-1").unwrap();
        assert!(limiter.admit("client-1").is_err());

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(limiter.admit("client-1").is_ok());
        assert_eq!(limiter.remaining("client-1"), 1);
    }

    #[tokio::test]
    async fn test_remaining() {
        let limiter = limiter(5, 60);

        assert_eq!(limiter.remaining("client-1"), 5);
        limiter.admit("client-1").unwrap();
        limiter.admit("client-1").unwrap();
        assert_eq!(limiter.remaining("client-1"), 3);
    }
}
