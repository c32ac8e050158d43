//! Object Store — hash-indexed, LRU-ordered directory of cached objects
//! (spec.md §4.C).
//!
//! Grounded on `original_source/object.c`'s `findObject`/`makeObject`/
//! `privatiseObject` for the collision-eviction insertion invariant, and on
//! `teleport-daemon::cache::ChunkCache`'s `lru::LruCache` usage for the
//! idiomatic Rust shape of the LRU list itself. Per spec.md §4.C, the
//! source's single-occupant-with-collision-eviction policy is kept
//! faithfully rather than switched to bounded chaining (see DESIGN.md, Open
//! Question resolutions).

use std::collections::HashMap;

use lru::LruCache;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunk_pool::ChunkPool;
use crate::error::StoreError;
use crate::object::{Object, ObjectKind};

pub const MAX_KEY_SIZE: usize = 10_000;

/// Identity of a cached representation: (kind, key), per spec.md §2 "Data
/// flow" ("asks the Object Store for an object by (type, key)").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub key: Vec<u8>,
}

impl ObjectKey {
    pub fn new(kind: ObjectKind, key: Vec<u8>) -> Result<Self, StoreError> {
        if key.len() > MAX_KEY_SIZE {
            return Err(StoreError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        Ok(Self { kind, key })
    }
}

/// Slot identity for an object inside the store's arena, since Rust favors
/// an index-based handle over the source's raw pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u64);

/// Hash-indexed, LRU-ordered directory of cached objects.
///
/// The hash index and the LRU list are always consistent for PUBLIC
/// objects (invariant I1): every key in `index` names an id present in
/// `lru`, and vice versa.
pub struct ObjectStore {
    pool: Arc<ChunkPool>,
    objects: HashMap<ObjectId, Object>,
    index: HashMap<ObjectKey, ObjectId>,
    lru: LruCache<ObjectId, ()>,
    next_id: u64,

    object_high_mark: usize,
    public_object_low_mark: usize,

    public_count: usize,
    private_count: usize,
}

impl ObjectStore {
    pub fn new(pool: Arc<ChunkPool>, object_high_mark: usize) -> Self {
        Self {
            pool,
            objects: HashMap::new(),
            index: HashMap::new(),
            lru: LruCache::unbounded(),
            next_id: 1,
            object_high_mark,
            public_object_low_mark: object_high_mark / 2,
            public_count: 0,
            private_count: 0,
        }
    }

    pub fn public_count(&self) -> usize {
        self.public_count
    }

    pub fn private_count(&self) -> usize {
        self.private_count
    }

    fn alloc_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Spec.md §4.C `find`. On hit, moves the object to the LRU head and
    /// returns its id with an incremented refcount. Type, key size, and
    /// key bytes must all match; any mismatch is a miss (no collision
    /// walk — the store never chains).
    pub fn find(&mut self, key: &ObjectKey) -> Option<ObjectId> {
        let id = *self.index.get(key)?;
        // `get` (rather than `peek`) promotes the entry to the LRU head as
        // a side effect, per the `lru` crate's semantics.
        self.lru.get(&id);
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.retain();
        }
        Some(id)
    }

    /// Spec.md §4.C `make`. Returns the existing public object if one is
    /// cached; otherwise creates one, links it if `public`, and applies the
    /// high-mark/low-mark eviction triggers.
    pub fn make(
        &mut self,
        key: ObjectKey,
        public: bool,
    ) -> Result<ObjectId, StoreError> {
        if let Some(id) = self.find(&key) {
            return Ok(id);
        }

        if self.public_count + self.private_count >= self.object_high_mark {
            let reclaimed = self.run_eviction_pass();
            if reclaimed == 0 && self.public_count + self.private_count >= self.object_high_mark {
                warn!(
                    public = self.public_count,
                    private = self.private_count,
                    "object store at capacity after eviction pass"
                );
                return Err(StoreError::AtCapacity);
            }
        }

        let id = self.alloc_id();
        // Per spec.md §9 ("an idiomatic port should make publication a
        // distinct ownership"), the store's containment of a PUBLIC object
        // is modeled by plain Rust ownership (presence in `self.objects`),
        // not by an extra `retain()` — `refcount` counts only external
        // holders (waiters/handles), never the store's own indexing.
        let mut object = Object::new(key.kind, key.key.clone(), self.pool.clone());

        if public {
            object.set_public(true);
            self.index.insert(key, id);
            self.lru.put(id, ());
            self.public_count += 1;
        } else {
            self.private_count += 1;
        }

        self.objects.insert(id, object);

        if self.public_count >= self.public_object_low_mark {
            debug!(
                public = self.public_count,
                mark = self.public_object_low_mark,
                "public object count at low mark, deferred eviction should be scheduled"
            );
        }

        Ok(id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    /// Spec.md §4.C `privatise`. Unlinks from the hash bucket and LRU,
    /// clears PUBLIC. If refcount reaches (or already is) zero, destroys
    /// the object.
    pub fn privatise(&mut self, id: ObjectId) {
        let was_public = self
            .objects
            .get(&id)
            .map(|o| o.is_public())
            .unwrap_or(false);

        if !was_public {
            // Idempotent: privatise(privatise(o)) == privatise(o), spec.md §8.
            return;
        }

        if let Some(object) = self.objects.get_mut(&id) {
            let key = ObjectKey {
                kind: object.kind,
                key: object.key.clone(),
            };
            self.index.remove(&key);
            object.set_public(false);
            self.public_count -= 1;
            self.private_count += 1;
        }
        self.lru.pop(&id);

        self.destroy_if_eligible(id);
    }

    /// Releases the caller's reference and destroys the object if it has
    /// reached a destroyable state (spec.md I8).
    pub fn release(&mut self, id: ObjectId) {
        let reached_zero = match self.objects.get_mut(&id) {
            Some(object) => object.release(),
            None => return,
        };
        if reached_zero {
            self.destroy_if_eligible(id);
        }
    }

    fn destroy_if_eligible(&mut self, id: ObjectId) {
        // A PUBLIC object is never destroyed directly — it must go through
        // `privatise` first (I2: a private object is absent from both the
        // hash table and the LRU list; destroying in place would violate
        // that invariant for an object still indexed).
        let destroyable = self
            .objects
            .get(&id)
            .map(|o| o.destroyable() && !o.is_public())
            .unwrap_or(false);
        if destroyable {
            if let Some(object) = self.objects.remove(&id) {
                if object.is_public() {
                    self.public_count -= 1;
                } else {
                    self.private_count -= 1;
                }
            }
        }
    }

    /// Iterates ids from LRU tail (least recently used) to head, for the
    /// Eviction Engine's reclamation passes (spec.md §4.F).
    pub fn lru_tail_to_head(&self) -> Vec<ObjectId> {
        self.lru.iter().rev().map(|(id, _)| *id).collect()
    }

    pub fn lru_head_to_tail(&self) -> Vec<ObjectId> {
        self.lru.iter().map(|(id, _)| *id).collect()
    }

    /// Minimal on-the-spot reclamation triggered synchronously from `make`
    /// when the object count hits `object_high_mark`. Privatises refcount-0
    /// objects from the LRU tail; the full three-pass algorithm lives in
    /// `eviction.rs` and is driven by the scheduler for the deferred path.
    fn run_eviction_pass(&mut self) -> usize {
        let candidates = self.lru_tail_to_head();
        let mut reclaimed = 0;
        for id in candidates {
            let refcount = self.objects.get(&id).map(|o| o.refcount()).unwrap_or(0);
            if refcount == 0 {
                self.privatise(id);
                reclaimed += 1;
            }
            if self.public_count + self.private_count < self.object_high_mark {
                break;
            }
        }
        if reclaimed > 0 {
            info!(reclaimed, "synchronous eviction pass reclaimed objects");
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> ObjectStore {
        let pool = ChunkPool::new(16, 64, 40, 50, 60);
        ObjectStore::new(pool, 8)
    }

    fn key(s: &str) -> ObjectKey {
        ObjectKey::new(ObjectKind::Http, s.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn make_then_find_round_trips() {
        let mut store = test_store();
        let id = store.make(key("http://a/x"), true).unwrap();
        let found = store.find(&key("http://a/x")).unwrap();
        assert_eq!(id, found);
    }

    #[test]
    fn make_is_idempotent_for_existing_public_object() {
        let mut store = test_store();
        let id1 = store.make(key("http://a/x"), true).unwrap();
        let id2 = store.make(key("http://a/x"), true).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.public_count(), 1);
    }

    #[test]
    fn privatise_removes_from_index_and_lru() {
        let mut store = test_store();
        let id = store.make(key("http://a/x"), true).unwrap();
        store.get_mut(id).unwrap().retain();

        store.privatise(id);
        assert!(store.find(&key("http://a/x")).is_none());
        assert!(!store.lru_head_to_tail().contains(&id));
    }

    #[test]
    fn privatise_is_idempotent() {
        let mut store = test_store();
        let id = store.make(key("http://a/x"), true).unwrap();
        store.get_mut(id).unwrap().retain();

        store.privatise(id);
        store.privatise(id);
        assert!(store.find(&key("http://a/x")).is_none());
    }

    #[test]
    fn mismatched_key_is_a_miss_not_a_collision_walk() {
        let mut store = test_store();
        store.make(key("http://a/x"), true).unwrap();
        assert!(store.find(&key("http://a/y")).is_none());
    }

    #[test]
    fn key_over_max_size_is_rejected() {
        let huge = vec![b'a'; MAX_KEY_SIZE + 1];
        let err = ObjectKey::new(ObjectKind::Http, huge).unwrap_err();
        assert!(matches!(err, StoreError::KeyTooLarge { .. }));
    }
}
