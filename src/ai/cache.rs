//! Response cache keyed by a canonicalized prompt fingerprint.
//!
//! TTL eviction per entry plus an overall LRU bound of 1,000 entries, per
//! the resource model's cap on per-provider caches.

use crate::ai::types::{AnalysisKind, AnalyzeOptions};
use crate::models::AiResponse;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const MAX_ENTRIES: usize = 1_000;

struct Entry {
    response: AiResponse,
    inserted_at: Instant,
    last_used: Instant,
}

pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

/// Canonicalize prompt + kind + model + options into a stable fingerprint.
/// Whitespace-normalized and with options sorted, or cache hit rates would
/// be near zero across semantically identical calls.
pub fn fingerprint(
    model: &str,
    kind: AnalysisKind,
    prompt: &str,
    options: &AnalyzeOptions,
) -> String {
    let normalized_prompt: String = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut parts = vec![
        model.to_string(),
        kind.as_str().to_string(),
        normalized_prompt,
    ];
    for (k, v) in &options.extra {
        parts.push(format!("{k}={v}"));
    }
    format!("{:x}", md5_like_hash(&parts.join("\u{1}")))
}

/// A small FNV-1a hash. Cache keys need stability and low collision rate,
/// not cryptographic strength.
fn md5_like_hash(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

impl ResponseCache {
    pub fn new(ttl_s: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_s),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<AiResponse> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = entries
            .get(key)
            .map(|e| now.duration_since(e.inserted_at) > self.ttl)
            .unwrap_or(true);
        if expired {
            entries.remove(key);
            return None;
        }
        let entry = entries.get_mut(key).expect("checked above");
        entry.last_used = now;
        let mut response = entry.response.clone();
        response.cache_hit = true;
        Some(response)
    }

    pub fn insert(&self, key: String, response: AiResponse) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.len() >= MAX_ENTRIES && !entries.contains_key(&key) {
            if let Some(lru_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&lru_key);
            }
        }
        entries.insert(
            key,
            Entry {
                response,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_whitespace_insensitive() {
        let options = AnalyzeOptions::default();
        let a = fingerprint("gpt-4o-mini", AnalysisKind::SignalGeneration, "hello   world", &options);
        let b = fingerprint("gpt-4o-mini", AnalysisKind::SignalGeneration, "hello world", &options);
        assert_eq!(a, b);
    }

    #[test]
    fn round_trip_hits_cache() {
        let cache = ResponseCache::new(300);
        let key = "k".to_string();
        cache.insert(key.clone(), AiResponse {
            content: "x".into(),
            confidence: 0.9,
            ..Default::default()
        });
        let hit = cache.get(&key).expect("present");
        assert!(hit.cache_hit);
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache = ResponseCache::new(0);
        cache.insert("k".into(), AiResponse {
            content: "x".into(),
            confidence: 0.9,
            ..Default::default()
        });
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
    }
}
