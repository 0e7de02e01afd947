//! Bounded, FIFO-evicted response cache (spec §4.1).
//!
//! Stores complete origin responses (status line, headers and body, as
//! received) keyed by request URL, plus a parsed header map used for
//! conditional revalidation. Capacity is fixed at construction; eviction is
//! strict FIFO by first insertion, not LRU.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One cached origin response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The full response exactly as received from the origin, including its
    /// status line and headers.
    pub body: Vec<u8>,
    /// Headers parsed out of `body`, keys case-preserved (spec §4.3.2).
    pub headers: HashMap<String, String>,
}

struct Inner {
    storage: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

/// Bounded mapping from request URL to [`CacheEntry`].
///
/// All operations take a single internal lock and are atomic with respect
/// to each other, matching the single-lock discipline in spec §5.
pub struct Cache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                storage: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Returns a clone of the stored entry for `url`, if present.
    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        let inner = self.inner.lock().unwrap();
        inner.storage.get(url).cloned()
    }

    /// Inserts or replaces the entry for `url`.
    ///
    /// If the store is already at capacity, the oldest-inserted entry is
    /// evicted first — even when `url` itself is already present, matching
    /// the reference implementation's unconditional "evict then insert"
    /// order (see SPEC_FULL.md, "Cache overwrite/FIFO interaction"). A
    /// replacing save only moves `url` to the back of the eviction queue in
    /// the one case where `url` itself was the evicted oldest entry; that
    /// incidental reordering is the same quirk the reference dict-based
    /// implementation exhibits and is reproduced deliberately, not fixed.
    pub fn save(&self, url: String, body: Vec<u8>, headers: HashMap<String, String>) {
        let mut inner = self.inner.lock().unwrap();

        if inner.storage.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.storage.remove(&oldest);
            }
        }

        let is_new = !inner.storage.contains_key(&url);
        inner.storage.insert(url.clone(), CacheEntry { body, headers });
        if is_new {
            inner.order.push_back(url);
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().storage.len()
    }
}
