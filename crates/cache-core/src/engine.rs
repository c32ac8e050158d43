//! Top-level `Engine` facade bundling the chunk pool, atom table, object
//! store, and eviction engine behind one handle, per spec.md §9 ("model
//! them as a single core-context struct, no globals").
//!
//! Per the concurrency model in spec.md §5 (expanded in `SPEC_FULL.md`
//! §5): every mutating method takes `&mut self`, there is no interior
//! mutability anywhere in this struct, and `Engine` is driven from a single
//! task — either directly, or fed by an `mpsc` channel from `cache-proxy`'s
//! listener. This module also hosts the six end-to-end scenario tests from
//! spec.md §8.

use std::sync::Arc;

use crate::atom::AtomTable;
use crate::cache_control::CacheControl;
use crate::chunk_pool::ChunkPool;
use crate::collaborator::DiskCollaborator;
use crate::config::CacheConfig;
use crate::error::StoreError;
use crate::eviction::{EvictionConfig, EvictionEngine, EvictionStats};
use crate::object::{FreshnessConfig, Object, ObjectKind};
use crate::store::{ObjectId, ObjectKey, ObjectStore};

/// The single mutable core-context struct. Not `Sync`; owned and driven by
/// one task.
pub struct Engine {
    pub atoms: AtomTable,
    store: ObjectStore,
    eviction: EvictionEngine,
    freshness: FreshnessConfig,
    config: CacheConfig,
}

impl Engine {
    pub fn new(config: CacheConfig) -> Self {
        let pool = ChunkPool::new(
            config.chunk_size,
            config.total_chunks,
            config.chunk_low_mark,
            config.chunk_high_mark,
            config.chunk_critical_mark,
        );

        let store = ObjectStore::new(pool.clone(), config.object_high_mark);
        let eviction = EvictionEngine::new(
            pool,
            EvictionConfig {
                chunk_low_mark: config.chunk_low_mark,
                chunk_critical_mark: config.chunk_critical_mark,
                max_writeout_when_idle: config.max_writeout_when_idle,
            },
        );
        let freshness = FreshnessConfig {
            cache_is_shared: config.cache_is_shared,
            mindlessly_cache_vary: config.mindlessly_cache_vary,
            max_expires_age: config.max_expires_age_secs,
            max_age: config.max_age_secs,
            max_age_fraction: config.max_age_fraction,
            max_no_modified_age: config.max_no_modified_age_secs,
        };

        Self {
            atoms: AtomTable::new(),
            store,
            eviction,
            freshness,
            config,
        }
    }

    pub fn find(&mut self, kind: ObjectKind, key: &[u8]) -> Result<Option<ObjectId>, StoreError> {
        let key = ObjectKey::new(kind, key.to_vec())?;
        Ok(self.store.find(&key))
    }

    pub fn make(&mut self, kind: ObjectKind, key: &[u8], public: bool) -> Result<ObjectId, StoreError> {
        let key = ObjectKey::new(kind, key.to_vec())?;
        self.store.make(key, public)
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.store.get(id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.store.get_mut(id)
    }

    pub fn privatise(&mut self, id: ObjectId) {
        self.store.privatise(id)
    }

    pub fn release(&mut self, id: ObjectId) {
        self.store.release(id)
    }

    /// Aborts object `id`, interning `message` through the atom table
    /// before storing it (spec.md §3: "message: last status code + reason
    /// atom"). No-op if the object no longer exists.
    pub fn abort(&mut self, id: ObjectId, code: u16, message: String) {
        let atom = self.atoms.intern(message.as_bytes());
        if let Some(obj) = self.store.get_mut(id) {
            obj.abort(code, atom);
        }
    }

    pub fn is_stale(&self, id: ObjectId, req_cc: &CacheControl, now: i64) -> Option<bool> {
        self.store
            .get(id)
            .map(|o| o.is_stale(req_cc, now, &self.freshness))
    }

    pub fn must_revalidate(&self, id: ObjectId, req_cc: &CacheControl, now: i64) -> Option<bool> {
        self.store
            .get(id)
            .map(|o| o.must_revalidate(req_cc, now, &self.freshness))
    }

    /// Runs one eviction pass against the current store state (spec.md
    /// §4.F). `force` widens pass 3 regardless of the critical watermark.
    pub fn run_eviction(&mut self, disk: &dyn DiskCollaborator, force: bool) -> EvictionStats {
        self.eviction.run(&mut self.store, disk, force)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use crate::error::WaiterStatus;
    use std::sync::Mutex;

    fn test_engine() -> Engine {
        let mut config = CacheConfig::default();
        config.total_chunks = 64;
        config.chunk_low_mark = 40;
        config.chunk_high_mark = 50;
        config.chunk_critical_mark = 60;
        config.chunk_size = 16;
        config.object_high_mark = 100;
        Engine::new(config)
    }

    /// Scenario 1: Coalesced fetch. Two waiters register on a freshly
    /// made object; both must fire exactly once with size==10 and the
    /// expected bytes.
    #[test]
    fn scenario_coalesced_fetch() {
        let mut engine = test_engine();
        let id = engine
            .make(ObjectKind::Http, b"http://a/x", true)
            .unwrap();

        let fired_a = Arc::new(Mutex::new(0));
        let fired_b = Arc::new(Mutex::new(0));
        {
            let obj = engine.object_mut(id).unwrap();
            let fa = fired_a.clone();
            obj.register_handler(Box::new(move |status| {
                assert_eq!(status, WaiterStatus::Progress);
                *fa.lock().unwrap() += 1;
                true
            }));
            let fb = fired_b.clone();
            obj.register_handler(Box::new(move |status| {
                assert_eq!(status, WaiterStatus::Progress);
                *fb.lock().unwrap() += 1;
                true
            }));
        }

        let obj = engine.object_mut(id).unwrap();
        obj.partial(Some(10), None).unwrap();
        obj.add_data(b"abcdefghij", 0, 10).unwrap();
        obj.set_inprogress(false);

        assert_eq!(*fired_a.lock().unwrap(), 1);
        assert_eq!(*fired_b.lock().unwrap(), 1);
        assert_eq!(engine.object(id).unwrap().size, 10);
        assert_eq!(engine.object(id).unwrap().read(0, 10).unwrap(), b"abcdefghij");
    }

    /// Scenario 2: Abort during fetch. The waiter fires once; object
    /// becomes private with size==0 and ABORTED set; a subsequent find
    /// returns nothing.
    #[test]
    fn scenario_abort_during_fetch() {
        let mut engine = test_engine();
        let id = engine
            .make(ObjectKind::Http, b"http://a/y", true)
            .unwrap();

        let fired = Arc::new(Mutex::new(0));
        {
            let obj = engine.object_mut(id).unwrap();
            let f = fired.clone();
            obj.register_handler(Box::new(move |_status| {
                *f.lock().unwrap() += 1;
                true
            }));
        }

        engine.abort(id, 502, "Bad Gateway".to_string());

        assert_eq!(*fired.lock().unwrap(), 1);
        assert_eq!(engine.object(id).unwrap().size, 0);
        assert!(engine
            .object(id)
            .unwrap()
            .flags()
            .contains(crate::object::ObjectFlags::ABORTED));
        assert!(engine.find(ObjectKind::Http, b"http://a/y").unwrap().is_none());
    }

    /// Scenario 3: Chunk eviction then refill.
    #[test]
    fn scenario_chunk_eviction_then_refill() {
        let mut engine = test_engine();
        let id = engine
            .make(ObjectKind::Http, b"http://a/z", true)
            .unwrap();

        let chunk_size = 16u64;
        let obj = engine.object_mut(id).unwrap();
        let buf = vec![5u8; (chunk_size * 3) as usize];
        obj.add_data(&buf, 0, buf.len()).unwrap();
        assert!(obj.punch_chunk(1));
        assert_eq!(obj.hole_size(chunk_size), chunk_size as i64);

        let refill = vec![6u8; chunk_size as usize];
        obj.add_data(&refill, chunk_size, refill.len()).unwrap();
        assert_eq!(obj.hole_size(chunk_size), 0);
    }

    /// Scenario 4: Freshness Expires path.
    #[test]
    fn scenario_freshness_expires_path() {
        let mut engine = test_engine();
        let id = engine
            .make(ObjectKind::Http, b"http://a/w", true)
            .unwrap();
        {
            let obj = engine.object_mut(id).unwrap();
            obj.partial(None, None).unwrap();
            obj.date = 1000;
            obj.age = 1000;
            obj.expires = 1100;
        }

        let req_cc = CacheControl::new();
        assert_eq!(engine.is_stale(id, &req_cc, 1050), Some(false));
        assert_eq!(engine.is_stale(id, &req_cc, 1101), Some(true));
    }

    /// Scenario 5: Revalidation gate ignores max-stale when
    /// MUST_REVALIDATE is set.
    #[test]
    fn scenario_revalidation_gate() {
        use crate::cache_control::CacheControlFlags;

        let mut engine = test_engine();
        let id = engine
            .make(ObjectKind::Http, b"http://a/v", true)
            .unwrap();
        {
            let obj = engine.object_mut(id).unwrap();
            obj.partial(None, None).unwrap();
            obj.cache_control = CacheControlFlags::MUST_REVALIDATE;
            obj.date = 1000;
            obj.age = 1000;
            obj.expires = 1100;
        }

        let mut req_cc = CacheControl::new();
        req_cc.max_stale = 1000;
        assert_eq!(engine.is_stale(id, &req_cc, 1101), Some(true));
    }

    /// Scenario 6: Supersede during read. A reader holds a lock on chunk
    /// 0 and has a handler registered; supersede notifies, the reader
    /// unlocks and releases, and the object becomes destroyable.
    #[test]
    fn scenario_supersede_during_read() {
        let mut engine = test_engine();
        let id = engine
            .make(ObjectKind::Http, b"http://a/u", true)
            .unwrap();

        let saw_notify = Arc::new(Mutex::new(false));
        {
            let obj = engine.object_mut(id).unwrap();
            obj.add_data(&[1u8; 16], 0, 16).unwrap();
            obj.lock_chunk(0);
            let saw = saw_notify.clone();
            obj.register_handler(Box::new(move |_status| {
                *saw.lock().unwrap() = true;
                true
            }));
        }

        engine.object_mut(id).unwrap().supersede();
        assert!(*saw_notify.lock().unwrap());
        assert!(!engine.object(id).unwrap().is_public());

        let obj = engine.object_mut(id).unwrap();
        obj.unlock_chunk(0);
        let destroyed_refs = obj.release_notify();
        assert!(destroyed_refs);
        assert!(obj.destroyable());
    }
}
