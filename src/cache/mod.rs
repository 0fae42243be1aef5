//! In-process response cache
//!
//! Bounded, TTL-expiring map keyed by a stable hash of the request. A hit
//! never blocks a concurrent miss on a different key; concurrent misses on
//! the same key both proceed (double work is bounded and avoids
//! head-of-line blocking).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::{ChatRequest, ChatResponse, FinishReason};

/// Cache tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry ceiling; exceeding it evicts the least-recently-read entry
    pub max_entries: usize,
    /// Time-to-live in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Stable hash over the request fields that determine the answer.
///
/// `stream` and `session_id` are deliberately excluded: the same question
/// over a different transport or session is the same question.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(provider: &str, request: &ChatRequest) -> Self {
        let keyed = serde_json::json!({
            "provider": provider,
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_output_tokens": request.max_output_tokens,
            "top_p": request.top_p,
            "stop": request.stop,
            "tools": request.tools,
        });
        let mut hasher = Sha256::new();
        hasher.update(keyed.to_string().as_bytes());
        CacheKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct StoredEntry {
    response: ChatResponse,
    created_at: Instant,
    last_read_at: Instant,
    hit_count: u64,
    size_bytes: usize,
}

impl StoredEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    /// Σ over hits of the original response cost
    pub estimated_savings: f64,
}

/// The response cache.
pub struct ResponseCache {
    entries: DashMap<CacheKey, StoredEntry>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Micro-dollars, so savings can live in an atomic
    savings_microusd: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            savings_microusd: AtomicU64::new(0),
        }
    }

    /// Look up a response. On a hit the entry's read timestamp and hit
    /// count advance atomically with the lookup.
    pub fn get(&self, key: &CacheKey) -> Option<(ChatResponse, u64)> {
        let ttl = self.config.ttl();

        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired(ttl) {
                drop(entry);
                self.entries.remove(key);
            } else {
                entry.last_read_at = Instant::now();
                entry.hit_count += 1;
                let hits = entry.hit_count;
                self.hits.fetch_add(1, Ordering::Relaxed);
                let saved = (entry.response.cost_usd * 1e6).round() as u64;
                self.savings_microusd.fetch_add(saved, Ordering::Relaxed);
                debug!(key = %key.as_str(), hits, "response cache hit");
                return Some((entry.response.clone(), hits));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a response. Only complete, non-streamed answers are cacheable:
    /// truncated or tool-invoking responses are refused.
    pub fn put(&self, key: CacheKey, response: &ChatResponse) -> bool {
        if response.finish_reason != FinishReason::Stop {
            return false;
        }

        let size_bytes = serde_json::to_string(response).map(|s| s.len()).unwrap_or(0);
        self.entries.insert(
            key,
            StoredEntry {
                response: response.clone(),
                created_at: Instant::now(),
                last_read_at: Instant::now(),
                hit_count: 0,
                size_bytes,
            },
        );
        self.enforce_capacity();
        true
    }

    /// TTL-first eviction; on remaining size pressure the least-recently-read
    /// entry goes.
    fn enforce_capacity(&self) {
        if self.entries.len() <= self.config.max_entries {
            return;
        }

        let ttl = self.config.ttl();
        self.entries.retain(|_, entry| !entry.is_expired(ttl));

        while self.entries.len() > self.config.max_entries {
            let mut victim: Option<(CacheKey, Instant)> = None;
            for entry in self.entries.iter() {
                let stale = entry.value().last_read_at;
                match &victim {
                    Some((_, oldest)) if stale >= *oldest => {}
                    _ => victim = Some((entry.key().clone(), stale)),
                }
            }
            match victim {
                Some((key, _)) => {
                    debug!(key = %key.as_str(), "evicting least-recently-read cache entry");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            estimated_savings: self.savings_microusd.load(Ordering::Relaxed) as f64 / 1e6,
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.savings_microusd.store(0, Ordering::Relaxed);
    }

    /// Total serialized size of resident entries.
    pub fn resident_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.value().size_bytes).sum()
    }
}
