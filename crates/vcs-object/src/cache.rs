//! LRU cache for loaded object content.

use std::num::NonZeroUsize;

use lru::LruCache;
use vcs_hash::ObjectId;

use crate::ObjectType;

/// A cached object: kind plus content bytes (no header).
pub type CachedObject = (ObjectType, Vec<u8>);

/// LRU cache keyed by object id.
///
/// Objects are immutable, so entries never need invalidation.
pub struct ObjectCache {
    cache: LruCache<ObjectId, CachedObject>,
}

impl ObjectCache {
    /// Create with the given capacity (number of objects).
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
        }
    }

    /// Get a cached object, promoting it to most-recently-used.
    pub fn get(&mut self, id: &ObjectId) -> Option<&CachedObject> {
        self.cache.get(id)
    }

    /// Insert an object. Returns the evicted entry if the cache was full.
    pub fn insert(&mut self, id: ObjectId, obj: CachedObject) -> Option<(ObjectId, CachedObject)> {
        self.cache.push(id, obj)
    }

    /// Whether the id is cached (without promoting).
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.cache.contains(id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn insert_and_get() {
        let mut cache = ObjectCache::new(4);
        cache.insert(id(1), (ObjectType::Blob, b"data".to_vec()));
        let (ty, data) = cache.get(&id(1)).unwrap();
        assert_eq!(*ty, ObjectType::Blob);
        assert_eq!(data, b"data");
        assert!(!cache.contains(&id(2)));
    }

    #[test]
    fn eviction_order_is_lru() {
        let mut cache = ObjectCache::new(2);
        cache.insert(id(1), (ObjectType::Blob, vec![]));
        cache.insert(id(2), (ObjectType::Blob, vec![]));
        cache.get(&id(1)); // promote 1
        cache.insert(id(3), (ObjectType::Blob, vec![]));
        assert!(cache.contains(&id(1)));
        assert!(!cache.contains(&id(2)));
        assert!(cache.contains(&id(3)));
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let mut cache = ObjectCache::new(0);
        cache.insert(id(1), (ObjectType::Blob, vec![]));
        assert_eq!(cache.len(), 1);
    }
}
