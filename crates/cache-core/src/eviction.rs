//! Eviction Engine — triggered and scheduled reclamation across chunk and
//! object pressure levels (spec.md §4.F).
//!
//! Grounded on `original_source/object.c`'s `discardObjects` for the
//! three-pass algorithm (tail-chunk shedding, object privatisation,
//! hole-punching) and on `teleport-daemon::gc::GarbageCollector` for the
//! Rust shape: a watermark-carrying struct, a `run`/`maybe_run` entry point,
//! and a `Stats` return value logged with `tracing::info!`.

use tracing::{debug, info};

use crate::chunk_pool::ChunkPool;
use crate::collaborator::DiskCollaborator;
use crate::object::ObjectKind;
use crate::store::{ObjectId, ObjectStore};
use std::sync::Arc;

/// Tunables for the Eviction Engine, from spec.md §6's configuration table.
#[derive(Debug, Clone, Copy)]
pub struct EvictionConfig {
    pub chunk_low_mark: usize,
    pub chunk_critical_mark: usize,
    pub max_writeout_when_idle: usize,
}

/// Bytes reclaimed and objects touched during one reclamation pass,
/// mirroring `GarbageCollector`'s `GcStats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvictionStats {
    pub chunks_shed: usize,
    pub objects_privatised: usize,
    pub chunks_punched: usize,
}

/// Walks the store's LRU list reclaiming chunks and objects under memory
/// pressure, per spec.md §4.F's three passes.
pub struct EvictionEngine {
    pool: Arc<ChunkPool>,
    config: EvictionConfig,
    in_progress: bool,
}

impl EvictionEngine {
    pub fn new(pool: Arc<ChunkPool>, config: EvictionConfig) -> Self {
        Self {
            pool,
            config,
            in_progress: false,
        }
    }

    /// Runs one full reclamation pass against `store`, using `disk` for the
    /// write-out side of each pass. `force` widens pass 3 (hole-punching) to
    /// run regardless of the critical watermark, matching the source's
    /// `force`/`all` flags to `discardObjects`.
    pub fn run(
        &mut self,
        store: &mut ObjectStore,
        disk: &dyn DiskCollaborator,
        force: bool,
    ) -> EvictionStats {
        assert!(!self.in_progress, "discardObjects is not re-entrant globally");
        self.in_progress = true;

        let mut stats = EvictionStats::default();
        let ids = store.lru_tail_to_head();

        // Pass 1: tail-chunk shedding.
        for &id in &ids {
            self.shed_tail_chunks(store, disk, id, &mut stats);
        }

        // Pass 2: object privatisation for refcount == 0 objects.
        for &id in &ids {
            let (refcount, is_public) = match store.get(id) {
                Some(o) => (o.refcount(), o.is_public()),
                None => continue,
            };
            if refcount == 0 && is_public {
                self.writeout_remaining(store, disk, id);
                store.privatise(id);
                stats.objects_privatised += 1;
            }
        }

        // Pass 3: hole-punching, only under critical pressure or `force`.
        if force || self.pool.used_chunks() > self.config.chunk_critical_mark {
            for &id in &ids {
                self.punch_holes(store, disk, id, &mut stats);
            }
        }

        info!(
            chunks_shed = stats.chunks_shed,
            objects_privatised = stats.objects_privatised,
            chunks_punched = stats.chunks_punched,
            "eviction pass complete"
        );

        self.in_progress = false;
        stats
    }

    fn shed_tail_chunks(
        &self,
        store: &mut ObjectStore,
        disk: &dyn DiskCollaborator,
        id: ObjectId,
        stats: &mut EvictionStats,
    ) {
        let (is_public, numchunks) = match store.get(id) {
            Some(o) => (o.is_public(), o.numchunks()),
            None => return,
        };
        if !is_public || numchunks <= self.config.chunk_low_mark / 4 {
            return;
        }

        for i in 0..numchunks {
            let Some(object) = store.get(id) else { return };
            if !object.chunk_full_and_unlocked(i) {
                break;
            }
            let Some(bytes) = object.chunk_bytes(i) else { break };

            disk.writeout_to_disk(object.kind, &object.key, i, &bytes);
            if let Some(object) = store.get_mut(id) {
                object.punch_chunk(i);
                stats.chunks_shed += 1;
            }
        }
    }

    fn writeout_remaining(
        &self,
        store: &ObjectStore,
        disk: &dyn DiskCollaborator,
        id: ObjectId,
    ) {
        let Some(object) = store.get(id) else { return };
        for i in 0..object.numchunks() {
            if let Some(bytes) = object.chunk_bytes(i) {
                disk.writeout_to_disk(object.kind, &object.key, i, &bytes);
            }
        }
        disk.destroy_disk_entry(object.kind, &object.key, false);
    }

    fn punch_holes(
        &self,
        store: &mut ObjectStore,
        disk: &dyn DiskCollaborator,
        id: ObjectId,
        stats: &mut EvictionStats,
    ) {
        let (is_public, numchunks) = match store.get(id) {
            Some(o) => (o.is_public(), o.numchunks()),
            None => return,
        };
        if !is_public {
            return;
        }

        for i in (0..numchunks).rev() {
            let Some(object) = store.get(id) else { return };
            if !object.chunk_full_and_unlocked(i) {
                continue;
            }
            let Some(bytes) = object.chunk_bytes(i) else { continue };
            disk.writeout_to_disk(object.kind, &object.key, i, &bytes);

            if let Some(object) = store.get_mut(id) {
                if object.punch_chunk(i) {
                    stats.chunks_punched += 1;
                }
            }

            if self.pool.used_chunks() <= self.config.chunk_critical_mark {
                break;
            }
        }
    }

    /// Spec.md §4.F `writeoutObjects(all)`: the write-out side without
    /// eviction, walking the LRU from head in budgeted slices, yielding
    /// whenever the scheduler reports other work pending.
    pub fn writeout_objects(
        &self,
        store: &ObjectStore,
        disk: &dyn DiskCollaborator,
        work_to_do: impl Fn() -> bool,
        all: bool,
    ) {
        let mut budget = self.config.max_writeout_when_idle;
        for id in store.lru_head_to_tail() {
            if work_to_do() {
                debug!("writeoutObjects yielding: external work pending");
                return;
            }
            let Some(object) = store.get(id) else { continue };
            if !all && object.refcount() == 0 {
                continue;
            }
            for i in 0..object.numchunks() {
                if budget == 0 {
                    return;
                }
                if let Some(bytes) = object.chunk_bytes(i) {
                    let n = bytes.len().min(budget);
                    disk.writeout_to_disk(object.kind, &object.key, i, &bytes[..n]);
                    budget -= n;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectKey;
    use std::cell::RefCell;

    struct NullDisk {
        writes: RefCell<usize>,
    }

    impl DiskCollaborator for NullDisk {
        fn writeout_to_disk(&self, _kind: ObjectKind, _key: &[u8], _chunk: usize, _bytes: &[u8]) -> usize {
            *self.writes.borrow_mut() += 1;
            _bytes.len()
        }
        fn revalidate_disk_entry(&self, _kind: ObjectKind, _key: &[u8]) {}
        fn dirty_disk_entry(&self, _kind: ObjectKind, _key: &[u8]) {}
        fn destroy_disk_entry(&self, _kind: ObjectKind, _key: &[u8], _dallying: bool) {}
        fn object_get_from_disk(&self, _kind: ObjectKind, _key: &[u8]) -> Option<Vec<u8>> {
            None
        }
    }

    #[test]
    fn privatises_refcount_zero_objects() {
        let pool = ChunkPool::new(16, 64, 4, 6, 8);
        let mut store = ObjectStore::new(pool.clone(), 100);
        let key = ObjectKey::new(ObjectKind::Http, b"http://a/x".to_vec()).unwrap();
        let id = store.make(key.clone(), true).unwrap();
        // `refcount` starts at 1 for the caller's own handle from `make`;
        // publication itself holds no refcount share (spec.md §9). One
        // release brings external holders to zero.
        store.release(id);

        let disk = NullDisk { writes: RefCell::new(0) };
        let mut engine = EvictionEngine::new(
            pool,
            EvictionConfig {
                chunk_low_mark: 40,
                chunk_critical_mark: 60,
                max_writeout_when_idle: 65536,
            },
        );
        let stats = engine.run(&mut store, &disk, false);
        assert_eq!(stats.objects_privatised, 1);
        assert!(store.find(&key).is_none());
    }
}
