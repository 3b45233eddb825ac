//! Verdict cache keyed by session fingerprint.
//!
//! Entries expire after a fixed TTL, checked on every lookup and evicted
//! lazily. The cache also hands out per-fingerprint compute guards so that
//! concurrent misses on one fingerprint serialize: the first caller scores,
//! the rest wait on the guard and then hit the freshly written entry. Memory
//! only; nothing survives a restart.

use crate::types::verdict::Verdict;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

struct CacheEntry {
    verdict: Verdict,
    inserted_at: Instant,
}

pub struct VerdictCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl VerdictCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a verdict; expired entries are treated as misses and evicted.
    pub async fn get(&self, fingerprint: &str) -> Option<Verdict> {
        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.verdict.clone());
                }
                Some(_) => {} // expired, evict below
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(fingerprint) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.verdict.clone());
            }
            entries.remove(fingerprint);
        }
        None
    }

    pub async fn put(&self, fingerprint: &str, verdict: Verdict) {
        let mut entries = self.entries.write().await;
        entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                verdict,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Get or create the compute guard for a fingerprint.
    ///
    /// Callers that miss must lock the returned guard, re-check the cache,
    /// and only then compute. Losers of the race find the winner's verdict
    /// on the re-check, so the models run at most once per fingerprint.
    pub async fn compute_guard(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        inflight
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the compute guard once the entry is written. Stragglers still
    /// holding the old guard re-check the cache after acquiring it.
    pub async fn release_guard(&self, fingerprint: &str) {
        let mut inflight = self.inflight.lock().await;
        inflight.remove(fingerprint);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn verdict(score: f64) -> Verdict {
        Verdict {
            fused_score: score,
            xgb_score: score,
            lstm_score: score,
            confidence: 0.5,
            is_alert: score >= 0.5,
            filtered: false,
            reason: None,
            model_version: "v1".to_string(),
            computed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = VerdictCache::new(Duration::from_secs(300));

        cache.put("fp-1", verdict(0.7)).await;

        let hit = cache.get("fp-1").await.unwrap();
        assert_eq!(hit.fused_score, 0.7);
        assert!(cache.get("fp-2").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = VerdictCache::new(Duration::from_secs(300));

        cache.put("fp-1", verdict(0.7)).await;

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("fp-1").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("fp-1").await.is_none());
        // Lazy eviction removed the entry
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = VerdictCache::new(Duration::from_secs(300));

        cache.put("fp-1", verdict(0.3)).await;
        cache.put("fp-1", verdict(0.9)).await;

        assert_eq!(cache.get("fp-1").await.unwrap().fused_score, 0.9);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_guard_is_shared_until_released() {
        let cache = VerdictCache::new(Duration::from_secs(300));

        let a = cache.compute_guard("fp-1").await;
        let b = cache.compute_guard("fp-1").await;
        assert!(Arc::ptr_eq(&a, &b));

        cache.release_guard("fp-1").await;
        let c = cache.compute_guard("fp-1").await;
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_guard_serializes_writers() {
        let cache = Arc::new(VerdictCache::new(Duration::from_secs(300)));
        let computes = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            let computes = computes.clone();
            handles.push(tokio::spawn(async move {
                if let Some(v) = cache.get("fp-1").await {
                    return v.fused_score;
                }
                let guard = cache.compute_guard("fp-1").await;
                let _held = guard.lock().await;
                if let Some(v) = cache.get("fp-1").await {
                    return v.fused_score;
                }
                computes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                cache.put("fp-1", verdict(0.8)).await;
                0.8
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 0.8);
        }
        assert_eq!(computes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
