//! External collaborator traits (spec.md §6) — the seam between the core
//! and I/O. Concrete implementations live in `cache-proxy`; the core only
//! ever depends on these trait objects, never on `tokio`/`reqwest`/disk
//! paths directly.
//!
//! New relative to the donor (it has no equivalent trait-seam for its
//! FUSE/QUIC I/O, which is concrete throughout); grounded on the general
//! shape of a small collaborator trait with one concrete implementation per
//! runtime concern, which is how the donor's own `Scheduler`-adjacent code
//! in `gc.rs`/`disk_cache.rs` is organized (a struct per concern, driven by
//! `tokio`).

use crate::object::ObjectKind;

/// On-disk persistence collaborator (spec.md §6). `cache-proxy::disk`
/// implements this against a content-addressed two-level directory cache.
pub trait DiskCollaborator: Send + Sync {
    /// Writes chunk `chunk_index`'s bytes for `(kind, key)` to disk.
    /// Returns the number of bytes actually written (the budget-respecting
    /// write-out path in `eviction.rs` uses this to track remaining
    /// budget).
    fn writeout_to_disk(&self, kind: ObjectKind, key: &[u8], chunk_index: usize, bytes: &[u8]) -> usize;

    /// Asks the disk layer to re-read its headers for `(kind, key)`
    /// in-place rather than invalidating the whole entry (spec.md §4.D
    /// `metadataChanged(revalidate=true)`).
    fn revalidate_disk_entry(&self, kind: ObjectKind, key: &[u8]);

    /// Marks the disk entry for `(kind, key)` dirty without a full
    /// revalidate (spec.md §4.D `metadataChanged(revalidate=false)`).
    fn dirty_disk_entry(&self, kind: ObjectKind, key: &[u8]);

    /// Destroys the on-disk entry for `(kind, key)`. `dallying` requests a
    /// best-effort delayed unlink rather than an immediate one, matching
    /// the source's `destroyDiskEntry(obj, dallying)`.
    fn destroy_disk_entry(&self, kind: ObjectKind, key: &[u8], dallying: bool);

    /// Reads back whatever bytes are on disk for `(kind, key)`, used to
    /// fill holes lazily (spec.md GLOSSARY "Hole").
    fn object_get_from_disk(&self, kind: ObjectKind, key: &[u8]) -> Option<Vec<u8>>;
}

/// Wall-clock collaborator (spec.md §6 `clock.now()`).
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Opaque handle to a scheduled time event, returned by
/// `Scheduler::schedule_time_event`. Dropping it does not cancel the event;
/// there is no cancellation operation in spec.md §6.
pub struct TimeEventHandle(pub u64);

/// Deferred-work collaborator (spec.md §6
/// `scheduler.scheduleTimeEvent`/`workToDo`).
pub trait Scheduler: Send + Sync {
    /// Schedules `callback` to run after `delay_seconds`. Returns `None` if
    /// the scheduler cannot accept more pending events.
    fn schedule_time_event(
        &self,
        delay_seconds: u64,
        callback: Box<dyn FnOnce() + Send>,
    ) -> Option<TimeEventHandle>;

    /// True if there is other work pending that a long-running idle task
    /// (`writeout_objects`) should yield to.
    fn work_to_do(&self) -> bool;
}

/// Upstream fetch collaborator (spec.md §6 `fetch.request`). Invoked by the
/// Object Store (via the Engine) when a fresh fetch is needed; drives the
/// object's `partial`/`add_data`/`abort` calls as bytes arrive.
pub trait FetchDriver: Send + Sync {
    fn request(
        &self,
        kind: ObjectKind,
        key: &[u8],
        from: u64,
        to: Option<u64>,
        method: &str,
    );
}
