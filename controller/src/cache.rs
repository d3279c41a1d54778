// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-boxed read-through cache
//!
//! Reconciliation passes re-fetch the image catalog and the maintenance
//! schedule on every activation.  Those answers change rarely, so concurrent
//! passes share a short-TTL cache.  This is strictly a performance layer:
//! the decision logic never sees it, and correctness never depends on it.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// A concurrent map of key to value where each entry expires `ttl` after
/// insertion
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<BTreeMap<K, Entry<V>>>,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<K: Ord, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> TtlCache<K, V> {
        TtlCache { ttl, entries: Mutex::new(BTreeMap::new()) }
    }

    /// Returns the cached value for `key` if one is present and not expired
    ///
    /// An expired entry is removed on the way out so the map cannot
    /// accumulate stale entries for keys that are never written again.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .lock()
            .unwrap()
            .insert(key, Entry { value, expires_at });
    }
}
