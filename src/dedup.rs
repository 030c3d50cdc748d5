use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A bounded FIFO set with per-entry TTL expiry.
///
/// Backs `EchoTable` (TTL 60s, unbounded capacity in practice since entries
/// expire) and the various `seenHashes`/`seenLogKeys` rings (bounded capacity,
/// no TTL). Both policies are expressed by the same struct: pass `usize::MAX`
/// for an effectively TTL-only table, or `Duration::MAX` for a capacity-only
/// ring.
#[derive(Debug)]
pub struct DedupTable<T> {
    entries: VecDeque<(T, Instant)>,
    capacity: usize,
    ttl: Duration,
}

impl<T: PartialEq> DedupTable<T> {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            ttl,
        }
    }

    /// Drop entries older than `ttl`, as of `now`.
    fn evict_expired(&mut self, now: Instant) {
        while let Some((_, inserted)) = self.entries.front() {
            if now.duration_since(*inserted) >= self.ttl {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// True if `key` is present and not expired.
    pub fn contains(&mut self, key: &T) -> bool {
        let now = Instant::now();
        self.evict_expired(now);
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert `key`, evicting expired entries and, if at capacity, the oldest
    /// surviving entry (FIFO).
    pub fn insert(&mut self, key: T) {
        let now = Instant::now();
        self.evict_expired(now);
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((key, now));
    }

    /// Convenience: true if `key` was already present; otherwise inserts it
    /// and returns false.
    pub fn check_and_insert(&mut self, key: T) -> bool {
        if self.contains(&key) {
            true
        } else {
            self.insert(key);
            false
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hash arbitrary text into the fixed-width key used by `EchoTable`/detector
/// cursors. Not cryptographic — collision resistance only needs to be good
/// enough to distinguish chat messages.
#[must_use]
pub fn hash_text(text: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
