// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded map evicting the least recently used entry.
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash as StdHash;

#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    recency: BTreeMap<u64, K>,
}

impl<K, V> LruCache<K, V>
where
    K: Clone + Eq + StdHash,
{
    /// Creates a cache holding at most `capacity` entries, at least one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value and marks it as most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + StdHash + ?Sized,
    {
        self.tick += 1;
        let (value, used) = self.entries.get_mut(key)?;
        let owned = self.recency.remove(used)?;
        *used = self.tick;
        self.recency.insert(self.tick, owned);
        Some(value)
    }

    /// Inserts a value, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        self.tick += 1;
        if let Some((_, used)) = self.entries.insert(key.clone(), (value, self.tick)) {
            self.recency.remove(&used);
        }
        self.recency.insert(self.tick, key);

        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + StdHash + ?Sized,
    {
        let (value, used) = self.entries.remove(key)?;
        self.recency.remove(&used);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::LruCache;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);

        // Touch "a" so "b" becomes the oldest entry.
        assert_eq!(cache.get("a"), Some(&1));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(&1));
        assert_eq!(cache.get("c"), Some(&3));
    }

    #[test]
    fn overwrite_and_remove() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(&2));

        assert_eq!(cache.remove("a"), Some(2));
        assert!(cache.is_empty());
        assert_eq!(cache.remove("a"), None);
    }
}
