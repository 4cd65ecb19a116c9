//! Bounded least-recently-used map.
//!
//! Entries live in an arena (`Vec`) and are chained into a recency list by
//! index, so touching an entry relinks two neighbours instead of moving
//! data. The hash index maps each key to its arena slot.
//!
//! The cache has no internal synchronization. Wrap it in a lock or keep it
//! owned by a single task.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use crate::core::SubstrateError;

#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity key/value store with O(1) get/put and LRU eviction.
///
/// ```
/// use prometheus_substrate::cache::LruCache;
///
/// let mut cache = LruCache::new(2).unwrap();
/// cache.put(1, 10);
/// cache.put(2, 20);
/// cache.get(&1);
/// cache.put(3, 30);
/// assert_eq!(cache.get_or(&2, -1), -1);
/// assert_eq!(cache.get_or(&1, -1), 10);
/// ```
#[derive(Debug)]
pub struct LruCache<K, V> {
    max_size: usize,
    index: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    /// Least recently used.
    head: Option<usize>,
    /// Most recently used.
    tail: Option<usize>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty cache holding at most `max_size` entries.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::InvalidArgument` if `max_size` is zero.
    pub fn new(max_size: usize) -> Result<Self, SubstrateError> {
        if max_size == 0 {
            return Err(SubstrateError::invalid("lru max_size must be greater than 0"));
        }
        Ok(Self {
            max_size,
            index: HashMap::with_capacity(max_size),
            slots: Vec::with_capacity(max_size),
            head: None,
            tail: None,
        })
    }

    /// Insert or overwrite `key`, making it the most recently used entry.
    ///
    /// Returns the entry evicted to make room, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&i) = self.index.get(&key) {
            self.slots[i].value = value;
            self.move_to_back(i);
            return None;
        }

        if self.slots.len() >= self.max_size {
            // Reuse the least recently used slot in place.
            let i = self.head?;
            let old_key = std::mem::replace(&mut self.slots[i].key, key.clone());
            let old_value = std::mem::replace(&mut self.slots[i].value, value);
            self.index.remove(&old_key);
            self.index.insert(key, i);
            self.move_to_back(i);
            return Some((old_key, old_value));
        }

        let i = self.slots.len();
        self.slots.push(Slot {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.index.insert(key, i);
        self.link_back(i);
        None
    }

    /// Look up `key` and mark it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = *self.index.get(key)?;
        self.move_to_back(i);
        Some(&self.slots[i].value)
    }

    /// Copy of the value for `key`, or `default` when absent.
    pub fn get_or<Q>(&mut self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Look up `key` without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).map(|&i| &self.slots[i].value)
    }

    /// Whether `key` is present. Does not touch recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Remove `key`; no-op if absent.
    pub fn erase<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = *self.index.get(key)?;
        Some(self.remove_slot(i).1)
    }

    /// Change the capacity, evicting least recently used entries to fit.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::InvalidArgument` if `max_size` is zero.
    pub fn set_max_size(&mut self, max_size: usize) -> Result<(), SubstrateError> {
        if max_size == 0 {
            return Err(SubstrateError::invalid("lru max_size must be greater than 0"));
        }
        while self.slots.len() > max_size {
            let Some(head) = self.head else { break };
            self.remove_slot(head);
        }
        self.max_size = max_size;
        Ok(())
    }

    /// Configured capacity.
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.head = None;
        self.tail = None;
    }

    /// Entries from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        std::iter::successors(self.head, |&i| self.slots[i].next).map(|i| {
            let slot = &self.slots[i];
            (&slot.key, &slot.value)
        })
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = (self.slots[i].prev, self.slots[i].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[i].prev = None;
        self.slots[i].next = None;
    }

    fn link_back(&mut self, i: usize) {
        self.slots[i].prev = self.tail;
        self.slots[i].next = None;
        match self.tail {
            Some(t) => self.slots[t].next = Some(i),
            None => self.head = Some(i),
        }
        self.tail = Some(i);
    }

    fn move_to_back(&mut self, i: usize) {
        if self.tail == Some(i) {
            return;
        }
        self.unlink(i);
        self.link_back(i);
    }

    fn remove_slot(&mut self, i: usize) -> (K, V) {
        self.unlink(i);
        let slot = self.slots.swap_remove(i);
        if i < self.slots.len() {
            // The former last slot now sits at `i`; repoint its neighbours.
            let (prev, next) = (self.slots[i].prev, self.slots[i].next);
            match prev {
                Some(p) => self.slots[p].next = Some(i),
                None => self.head = Some(i),
            }
            match next {
                Some(n) => self.slots[n].prev = Some(i),
                None => self.tail = Some(i),
            }
            if let Some(pos) = self.index.get_mut(&self.slots[i].key) {
                *pos = i;
            }
        }
        self.index.remove(&slot.key);
        (slot.key, slot.value)
    }
}
