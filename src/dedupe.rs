use chrono::Utc;
use std::collections::HashMap;

/// How long an alert for the same directive/blocked-uri pair is suppressed.
pub const VIOLATION_TTL_MS: i64 = 60_000;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Per-process table of recently alerted violations.
///
/// Entries are refreshed on every alert and evicted once they are older than
/// the TTL. Nothing is persisted; a restart forgets everything.
#[derive(Debug, Clone)]
pub struct DedupeCache {
    ttl_ms: i64,
    entries: HashMap<String, i64>,
}

impl Default for DedupeCache {
    fn default() -> Self {
        Self::new(VIOLATION_TTL_MS)
    }
}

impl DedupeCache {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            entries: HashMap::new(),
        }
    }

    pub fn key(directive: &str, blocked_uri: &str) -> String {
        format!("{}|{}", directive, blocked_uri)
    }

    /// Returns `false` if `key` was alerted less than a TTL ago. Otherwise
    /// records `now` for it, drops expired entries and returns `true`.
    pub fn admit(&mut self, key: &str, now: i64) -> bool {
        if let Some(last) = self.entries.get(key) {
            if now - *last < self.ttl_ms {
                return false;
            }
        }
        self.entries.insert(key.to_string(), now);
        self.purge(now);
        true
    }

    pub fn purge(&mut self, now: i64) {
        let ttl = self.ttl_ms;
        self.entries.retain(|_, ts| now - *ts <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_within_ttl_and_admits_after() {
        let mut cache = DedupeCache::default();
        let key = DedupeCache::key("script-src", "https://evil.example");
        assert!(cache.admit(&key, 1_000));
        assert!(!cache.admit(&key, 1_000 + VIOLATION_TTL_MS - 1));
        assert!(cache.admit(&key, 1_000 + VIOLATION_TTL_MS));
    }

    #[test]
    fn suppression_does_not_refresh_timestamp() {
        let mut cache = DedupeCache::new(100);
        assert!(cache.admit("k", 0));
        assert!(!cache.admit("k", 90));
        // still measured from the first alert
        assert!(cache.admit("k", 100));
    }

    #[test]
    fn keys_are_exact_pairs() {
        let mut cache = DedupeCache::default();
        assert!(cache.admit(&DedupeCache::key("script-src", "https://a"), 0));
        assert!(cache.admit(&DedupeCache::key("script-src-elem", "https://a"), 0));
        assert!(cache.admit(&DedupeCache::key("script-src", "https://b"), 0));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn stays_bounded_by_keys_alerted_in_one_window() {
        let mut cache = DedupeCache::new(100);
        let mut now = 0;
        for i in 0..50 {
            assert!(cache.admit(&format!("key-{i}"), now));
            now += 101;
            assert!(cache.admit("steady", now));
            assert!(cache.len() <= 2, "len {} at step {}", cache.len(), i);
        }
    }

    #[test]
    fn purge_keeps_entries_exactly_at_ttl() {
        let mut cache = DedupeCache::new(100);
        cache.admit("a", 0);
        cache.admit("b", 50);
        cache.purge(100);
        assert_eq!(cache.len(), 2);
        cache.purge(101);
        assert_eq!(cache.len(), 1);
        cache.purge(151);
        assert!(cache.is_empty());
    }
}
