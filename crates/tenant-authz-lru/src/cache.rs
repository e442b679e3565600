//! Slab-backed LRU cache
//!
//! Entries live in a `Vec` of nodes that form a doubly linked list through
//! slot indices (head = most recently used, tail = least recently used). A
//! `HashTable<usize>` indexes the slots by the hash of the key stored in the
//! slot, so a key is owned exactly once and never cloned.
//!
//! The cache never removes entries except by eviction, so the slab only grows
//! until it reaches capacity; from then on an eviction reuses the tail slot
//! for the incoming entry.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::num::NonZeroUsize;

use hashbrown::{DefaultHashBuilder, HashTable};

use crate::CacheError;

/// Sentinel for "no neighbour"
const NIL: usize = usize::MAX;

/// Slots reserved up front; larger caches grow on demand.
const MAX_PREALLOCATED_SLOTS: usize = 1 << 16;

struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// Fixed-capacity cache with strict least-recently-used eviction
///
/// # Recency rules
///
/// - [`get`](Self::get) on a resident key moves it to the most-recently-used
///   position
/// - [`insert`](Self::insert) of a resident key returns the stored value
///   unchanged and does not touch the ordering
/// - [`insert`](Self::insert) of a new key into a full cache evicts exactly
///   one entry, the least recently used, before admitting the new key
///
/// [`peek`](Self::peek), [`contains`](Self::contains) and [`iter`](Self::iter)
/// never change the ordering.
pub struct LruCache<K, V, S = DefaultHashBuilder> {
    index: HashTable<usize>,
    nodes: Vec<Node<K, V>>,
    head: usize,
    tail: usize,
    capacity: NonZeroUsize,
    hash_builder: S,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    /// Create an empty cache holding at most `capacity` entries
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self::with_hasher(capacity, DefaultHashBuilder::default())
    }

    /// Create an empty cache from a plain `usize` capacity
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ZeroCapacity`] if `capacity` is 0.
    pub fn with_capacity(capacity: usize) -> Result<Self, CacheError> {
        NonZeroUsize::new(capacity)
            .map(Self::new)
            .ok_or(CacheError::ZeroCapacity)
    }
}

impl<K, V, S> LruCache<K, V, S> {
    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Maximum number of resident entries
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate entries from most to least recently used
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            cursor: self.head,
            remaining: self.nodes.len(),
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = self.head;
        if self.head == NIL {
            self.tail = slot;
        } else {
            self.nodes[self.head].prev = slot;
        }
        self.head = slot;
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> LruCache<K, V, S> {
    /// Create an empty cache using `hash_builder` to hash keys
    pub fn with_hasher(capacity: NonZeroUsize, hash_builder: S) -> Self {
        let reserved = capacity.get().min(MAX_PREALLOCATED_SLOTS);
        Self {
            index: HashTable::with_capacity(reserved),
            nodes: Vec::with_capacity(reserved),
            head: NIL,
            tail: NIL,
            capacity,
            hash_builder,
        }
    }

    /// Look up `key`, promoting it to most recently used on a hit
    ///
    /// A miss leaves the cache untouched. The returned reference borrows the
    /// cache, so it cannot outlive the next mutating call.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.find(key)?;
        if slot != self.head {
            self.unlink(slot);
            self.push_front(slot);
        }
        Some(&self.nodes[slot].value)
    }

    /// Look up `key` without touching the recency order
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).map(|slot| &self.nodes[slot].value)
    }

    /// Whether `key` is resident (no recency change)
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).is_some()
    }

    /// Insert `value` under `key` and return a reference to the stored value
    ///
    /// If `key` is already resident the stored value is returned as is and
    /// `key`/`value` are dropped. Otherwise, when the cache is full, the least
    /// recently used entry is evicted first and the new entry becomes the most
    /// recently used one.
    pub fn insert(&mut self, key: K, value: V) -> &V {
        let hash = self.hash_builder.hash_one(&key);
        if let Some(&slot) = self.index.find(hash, |&s| self.nodes[s].key == key) {
            return &self.nodes[slot].value;
        }

        let slot = if self.nodes.len() < self.capacity.get() {
            self.nodes.push(Node {
                key,
                value,
                prev: NIL,
                next: NIL,
            });
            self.nodes.len() - 1
        } else {
            let victim = self.tail;
            self.evict(victim);
            let node = &mut self.nodes[victim];
            node.key = key;
            node.value = value;
            victim
        };

        self.push_front(slot);
        self.index
            .insert_unique(hash, slot, |&s| self.hash_builder.hash_one(&self.nodes[s].key));
        &self.nodes[slot].value
    }

    fn find<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.index
            .find(hash, |&s| self.nodes[s].key.borrow() == key)
            .copied()
    }

    /// Drop `slot` from the index and the recency list. The slot itself is
    /// left in place for the caller to overwrite.
    fn evict(&mut self, slot: usize) {
        let hash = self.hash_builder.hash_one(&self.nodes[slot].key);
        let removed = match self.index.find_entry(hash, |&s| s == slot) {
            Ok(entry) => {
                entry.remove();
                true
            }
            Err(_) => false,
        };
        debug_assert!(removed, "LRU tail slot {slot} missing from index");
        self.unlink(slot);
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for LruCache<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("entries", &DebugEntries(self))
            .finish()
    }
}

struct DebugEntries<'a, K, V, S>(&'a LruCache<K, V, S>);

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for DebugEntries<'_, K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// Iterator over cache entries, most recently used first
pub struct Iter<'a, K, V> {
    nodes: &'a [Node<K, V>],
    cursor: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            return None;
        }
        let node = &self.nodes[self.cursor];
        self.cursor = node.next;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl<'a, K, V, S> IntoIterator for &'a LruCache<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
