//! Object — chunked byte content + HTTP metadata + waiter list (spec.md
//! §4.D). The central entity of the cache; the single largest module, and
//! grounded directly on `original_source/object.c`'s `objectPartial`,
//! `objectAddData`/`objectAddChunk`/`objectAddChunkEnd`, `objectHoleSize`,
//! `abortObject`, `supersedeObject`, `notifyObject`, `objectIsStale`, and
//! `objectMustRevalidate` for algorithmic fidelity. Logging idiom follows
//! the donor crate's `tracing::{trace, debug, warn}` usage in `cache.rs`.

use std::sync::Arc;

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::atom::Atom;
use crate::cache_control::{CacheControl, CacheControlFlags};
use crate::chunk_pool::{ChunkPool, PooledChunk};
use crate::error::{ObjectError, WaiterStatus};

bitflags! {
    /// Object lifecycle and metadata flags, per spec.md §3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjectFlags: u16 {
        const INITIAL             = 1 << 0;
        const PUBLIC              = 1 << 1;
        const DYNAMIC             = 1 << 2;
        const LINEAR              = 1 << 3;
        const VALIDATING          = 1 << 4;
        const INPROGRESS          = 1 << 5;
        const FAILED              = 1 << 6;
        const ABORTED             = 1 << 7;
        const SUPERSEDED          = 1 << 8;
        const DISK_ENTRY_COMPLETE = 1 << 9;
    }
}

/// Selects how `key` is interpreted, replacing the source's small integer
/// `type` field (a reserved word in Rust) with an enum, per the donor's
/// preference for enums over raw integers (`FileType`, `LockType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Http,
    Dns,
    Local,
}

/// Sentinel for "unknown"/"unset" epoch-seconds and length fields, matching
/// the source's `-1` convention (spec.md §3).
pub const UNKNOWN: i64 = -1;

/// One slot in `Object::chunks`. A slot whose `data` is `None` is a hole
/// (spec.md §3 "chunks").
struct Chunk {
    data: Option<PooledChunk>,
    length: usize,
    lock: u32,
}

impl Chunk {
    fn empty() -> Self {
        Self {
            data: None,
            length: 0,
            lock: 0,
        }
    }

    fn is_hole(&self) -> bool {
        self.data.is_none()
    }
}

/// Opaque identifier for a registered waiter, returned by
/// `register_handler` and used to `unregister_handler`/`abort_handler` it.
///
/// Handlers are stored in a `Vec` rather than the source's intrusive
/// doubly-linked list (Rust has no cheap intrusive list without `unsafe`),
/// addressed by this generated id instead of a pointer (spec.md §9 Design
/// Notes, "cyclic references").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Handler {
    id: HandlerId,
    callback: Box<dyn FnMut(WaiterStatus) -> bool + Send>,
}

/// The central cache entity: chunked content, HTTP cache metadata, and a
/// waiter list, per spec.md §3 "Object".
pub struct Object {
    pub kind: ObjectKind,
    pub key: Vec<u8>,

    flags: ObjectFlags,

    pub code: u16,
    /// Status reason phrase, interned by the `Engine` through its
    /// `AtomTable` before being handed to `abort` (spec.md §4.B/§3: "last
    /// status code + reason atom"). Callers with no table in scope (the
    /// `partial` error path below, and direct `Object`-level tests) use
    /// `Atom::detached`.
    pub message: Option<Atom>,

    /// Raw response header block, owned by the caller before being handed
    /// in. `headers`/`via`/`etag` stay plain strings rather than atoms:
    /// unlike `message`, they are rarely repeated verbatim across objects,
    /// so there's little to gain from interning them (see DESIGN.md).
    pub headers: Option<String>,
    pub via: Option<String>,
    pub etag: Option<String>,

    pub date: i64,
    pub age: i64,
    pub expires: i64,
    pub last_modified: i64,
    pub atime: i64,

    pub cache_control: CacheControlFlags,
    pub s_maxage: i64,
    pub max_age: i64,
    pub min_fresh: i64,
    pub max_stale: i64,

    /// Declared total body length; `UNKNOWN` (-1) if not yet known.
    pub length: i64,
    /// Current filled byte count (monotonic nondecreasing while
    /// INPROGRESS unless aborted).
    pub size: u64,

    chunks: Vec<Chunk>,
    chunk_size: usize,
    pool: Arc<ChunkPool>,

    refcount: u32,
    handlers: Vec<Handler>,
    notifying: bool,

    pub disk_entry: bool,

    next_handler_seq: u64,
}

impl Object {
    /// Creates a fresh object in the INITIAL state, with `refcount == 1`
    /// representing the caller's own handle. `make_public`'s additional
    /// implicit +1 (spec.md §9, "hand-rolled refcount") is applied
    /// separately by the Store when it links the object, not here.
    pub fn new(kind: ObjectKind, key: Vec<u8>, pool: Arc<ChunkPool>) -> Self {
        Self {
            kind,
            key,
            flags: ObjectFlags::INITIAL,
            code: 0,
            message: None,
            headers: None,
            via: None,
            etag: None,
            date: UNKNOWN,
            age: UNKNOWN,
            expires: UNKNOWN,
            last_modified: UNKNOWN,
            atime: UNKNOWN,
            cache_control: CacheControlFlags::empty(),
            s_maxage: UNKNOWN,
            max_age: UNKNOWN,
            min_fresh: UNKNOWN,
            max_stale: UNKNOWN,
            length: UNKNOWN,
            size: 0,
            chunk_size: pool.chunk_size(),
            chunks: Vec::new(),
            pool,
            refcount: 1,
            handlers: Vec::new(),
            notifying: false,
            disk_entry: false,
            next_handler_seq: 1,
        }
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn is_public(&self) -> bool {
        self.flags.contains(ObjectFlags::PUBLIC)
    }

    pub fn numchunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    pub(crate) fn set_public(&mut self, public: bool) {
        if public {
            self.flags.insert(ObjectFlags::PUBLIC);
        } else {
            self.flags.remove(ObjectFlags::PUBLIC);
        }
    }

    pub(crate) fn set_inprogress(&mut self, inprogress: bool) {
        if inprogress {
            self.flags.insert(ObjectFlags::INPROGRESS);
            return;
        }

        let was_inprogress = self.flags.contains(ObjectFlags::INPROGRESS);
        self.flags.remove(ObjectFlags::INPROGRESS);
        if was_inprogress && !self.flags.contains(ObjectFlags::ABORTED) {
            self.notify_with(WaiterStatus::Complete);
        }
    }

    // ---- lifecycle: partial ------------------------------------------

    /// Called once by the fetch driver after it has a validated response
    /// head (spec.md §4.D `partial`).
    pub fn partial(
        &mut self,
        declared_length: Option<u64>,
        headers: Option<String>,
    ) -> Result<(), ObjectError> {
        if let Some(declared) = declared_length {
            if declared < self.size {
                warn!(
                    declared,
                    have = self.size,
                    "inconsistent content-length on partial()"
                );
                self.abort(502, Atom::detached(b"Inconsistent Content-Length"));
                return Err(ObjectError::InconsistentLength {
                    declared,
                    have: self.size,
                });
            }
        }

        self.length = declared_length.map(|l| l as i64).unwrap_or(UNKNOWN);
        self.headers = headers;
        self.flags.remove(ObjectFlags::INITIAL);
        self.mark_disk_entry_dirty_for_revalidation();
        self.notify();
        Ok(())
    }

    fn mark_disk_entry_dirty_for_revalidation(&mut self) {
        trace!(kind = ?self.kind, "object partial() -- disk entry revalidation requested");
    }

    // ---- chunk array management ---------------------------------------

    /// Grows the chunks array. Never shrinks (spec.md §4.D `setChunks`).
    pub fn set_chunks(&mut self, n: usize) {
        if n > self.chunks.len() {
            self.chunks.resize_with(n, Chunk::empty);
        }
    }

    /// Geometric growth target for `n` required chunks: grow by at least
    /// ×1.25, or exactly to fit `n`, whichever is larger (spec.md §4.D
    /// `addData`).
    fn grown_capacity(current: usize, required: usize) -> usize {
        let grown = current + current / 4;
        grown.max(required)
    }

    fn ensure_chunks(&mut self, required: usize) {
        if required > self.chunks.len() {
            let target = Self::grown_capacity(self.chunks.len(), required);
            self.set_chunks(target);
        }
    }

    pub fn lock_chunk(&mut self, i: usize) {
        assert!(i < self.chunks.len(), "lock_chunk index out of range");
        self.chunks[i].lock += 1;
    }

    pub fn unlock_chunk(&mut self, i: usize) {
        assert!(i < self.chunks.len(), "unlock_chunk index out of range");
        assert!(self.chunks[i].lock > 0, "unlock of an unlocked chunk");
        self.chunks[i].lock -= 1;
    }

    pub fn chunk_locked(&self, i: usize) -> bool {
        self.chunks.get(i).map(|c| c.lock > 0).unwrap_or(false)
    }

    /// Bytes of contiguous hole starting at `offset`, or `-1` if the
    /// offset is beyond the object or no hole begins there (spec.md §4.D
    /// `holeSize`).
    pub fn hole_size(&self, offset: u64) -> i64 {
        let i = (offset / self.chunk_size as u64) as usize;
        if i >= self.chunks.len() {
            return UNKNOWN;
        }
        if !self.chunks[i].is_hole() {
            return 0;
        }

        let mut j = i;
        while j < self.chunks.len() && self.chunks[j].is_hole() {
            j += 1;
        }

        if j >= self.chunks.len() {
            // Hole runs to the end of the allocated chunks; how far it
            // really extends isn't known yet.
            return UNKNOWN;
        }

        let r = offset % self.chunk_size as u64;
        let hole_bytes = (j - i) as u64 * self.chunk_size as u64 - r;
        hole_bytes as i64
    }

    // ---- addData --------------------------------------------------------

    /// Appends `len` bytes at `offset` (spec.md §4.D `addData`). Splits the
    /// write across chunk boundaries: a possibly partial leading segment
    /// within an existing chunk, zero or more whole chunks, and a possibly
    /// partial trailing segment, exactly mirroring `object.c`'s
    /// `objectAddData`/`objectAddChunk`/`objectAddChunkEnd` split.
    pub fn add_data(&mut self, buf: &[u8], offset: u64, len: usize) -> Result<(), ObjectError> {
        assert_eq!(buf.len(), len, "add_data buffer/length mismatch");

        if self.length >= 0 && offset + len as u64 > self.length as u64 {
            debug!(
                offset,
                len,
                length = self.length,
                "addData widens declared length"
            );
            self.length = (offset + len as u64) as i64;
        }

        let chunk_size = self.chunk_size as u64;
        let last_byte = offset + len as u64;
        let last_chunk = if last_byte == 0 {
            0
        } else {
            ((last_byte - 1) / chunk_size) as usize
        };
        self.ensure_chunks(last_chunk + 1);

        let mut written = 0usize;
        let mut cursor = offset;

        while written < len {
            let i = (cursor / chunk_size) as usize;
            let r = (cursor % chunk_size) as usize;
            let space_in_chunk = self.chunk_size - r;
            let remaining = len - written;
            let take = remaining.min(space_in_chunk);
            let whole_chunk = r == 0 && take == self.chunk_size;

            {
                let chunk = &self.chunks[i];
                if !whole_chunk && chunk.length < r {
                    warn!(chunk = i, offset = cursor, "chunk-middle write past unfilled prefix");
                    return Err(ObjectError::ChunkMiddleWrite {
                        chunk: i,
                        offset: cursor,
                    });
                }
            }

            let chunk = &mut self.chunks[i];
            if chunk.data.is_none() {
                chunk.data = Some(self.pool.acquire().ok_or(ObjectError::PoolExhausted)?);
            }
            let data = chunk.data.as_mut().expect("chunk buffer just ensured");
            data[r..r + take].copy_from_slice(&buf[written..written + take]);
            chunk.length = chunk.length.max(r + take);

            written += take;
            cursor += take as u64;
        }

        self.size = self.size.max(offset + len as u64);
        self.flags.remove(ObjectFlags::FAILED);
        self.notify();
        Ok(())
    }

    /// Convenience wrapper matching spec.md §4.D `printf`: formats
    /// `formatted` (already rendered by the caller, since Rust has no
    /// varargs) and writes it via `add_data`.
    pub fn printf(&mut self, offset: u64, formatted: &str) -> Result<(), ObjectError> {
        let bytes = formatted.as_bytes();
        self.add_data(bytes, offset, bytes.len())
    }

    /// Reads back `len` bytes starting at `offset`. Returns `None` if any
    /// requested byte falls in a hole or beyond `size`.
    pub fn read(&self, offset: u64, len: usize) -> Option<Vec<u8>> {
        if offset + len as u64 > self.size {
            return None;
        }

        let mut out = Vec::with_capacity(len);
        let mut cursor = offset;
        let mut remaining = len;
        let chunk_size = self.chunk_size as u64;

        while remaining > 0 {
            let i = (cursor / chunk_size) as usize;
            let r = (cursor % chunk_size) as usize;
            let chunk = self.chunks.get(i)?;
            if chunk.is_hole() || chunk.length <= r {
                return None;
            }
            let take = remaining.min(chunk.length - r);
            let data = chunk.data.as_ref().expect("non-hole chunk has data");
            out.extend_from_slice(&data[r..r + take]);
            cursor += take as u64;
            remaining -= take;
        }

        Some(out)
    }

    // ---- abort / supersede ---------------------------------------------

    /// Spec.md §4.D `abort`. Precondition: `code != 0`. `message` is the
    /// reason phrase, already interned by the caller (the `Engine` interns
    /// it through its `AtomTable`; direct callers with no table in scope
    /// use `Atom::detached`).
    pub fn abort(&mut self, code: u16, message: Atom) {
        assert_ne!(code, 0, "abort requires a non-zero status code");

        let message_text = String::from_utf8_lossy(message.as_bytes()).into_owned();

        self.flags.remove(ObjectFlags::INITIAL | ObjectFlags::VALIDATING);
        self.flags.insert(ObjectFlags::ABORTED);
        self.code = code;
        self.message = Some(message);
        self.length = 0;
        self.size = 0;
        self.headers = None;
        self.etag = None;

        if self.age >= 0 {
            if self.date >= 0 {
                self.date = self.date.min(self.age);
            }
            if self.expires >= 0 {
                self.expires = self.expires.min(self.age);
            }
            if self.last_modified >= 0 {
                self.last_modified = self.last_modified.min(self.age);
            }
        }

        self.dispose_unlocked_chunks();
        self.set_public(false);

        debug!(code, "object aborted");
        self.notify_with(WaiterStatus::Aborted {
            code,
            message: message_text,
        });
    }

    /// Spec.md §4.D `supersede`.
    pub fn supersede(&mut self) {
        self.flags.insert(ObjectFlags::SUPERSEDED);
        self.disk_entry = false;
        self.set_public(false);
        debug!("object superseded");
        self.notify();
    }

    fn dispose_unlocked_chunks(&mut self) {
        for chunk in &mut self.chunks {
            if chunk.lock == 0 {
                chunk.data = None;
                chunk.length = 0;
            }
        }
    }

    /// Frees any unlocked, full chunk buffer at index `i`, leaving a hole.
    /// Used by the Eviction Engine's hole-punching pass (spec.md §4.F).
    pub fn punch_chunk(&mut self, i: usize) -> bool {
        if let Some(chunk) = self.chunks.get_mut(i) {
            if chunk.lock == 0 && chunk.data.is_some() {
                chunk.data = None;
                return true;
            }
        }
        false
    }

    /// True if chunk `i` holds a full, unlocked buffer eligible for
    /// write-out and release (used by tail-chunk shedding, spec.md §4.F
    /// pass 1).
    pub fn chunk_full_and_unlocked(&self, i: usize) -> bool {
        self.chunks
            .get(i)
            .map(|c| c.lock == 0 && c.length == self.chunk_size && c.data.is_some())
            .unwrap_or(false)
    }

    /// Copies out the bytes of a full chunk for write-out, without
    /// disposing it (the caller disposes once it has confirmed the bytes
    /// reached disk).
    pub fn chunk_bytes(&self, i: usize) -> Option<Vec<u8>> {
        self.chunks.get(i).and_then(|c| {
            c.data
                .as_ref()
                .map(|d| d[..c.length].to_vec())
        })
    }

    // ---- refcount ---------------------------------------------------------

    pub fn retain(&mut self) {
        self.refcount += 1;
    }

    /// Returns `true` if the caller's decrement brought the refcount to
    /// zero (the caller is then responsible for destroying the object, per
    /// spec.md I8: legal only when `refcount==0`, no handlers, not
    /// INPROGRESS).
    pub fn release(&mut self) -> bool {
        assert!(self.refcount > 0, "double-free: release on refcount 0");
        self.refcount -= 1;
        self.refcount == 0
    }

    /// `release` followed by a notification if any references remain
    /// (spec.md §4.D `releaseNotify`).
    pub fn release_notify(&mut self) -> bool {
        let reached_zero = self.release();
        if !reached_zero {
            self.notify();
        }
        reached_zero
    }

    pub fn destroyable(&self) -> bool {
        self.refcount == 0 && self.handlers.is_empty() && !self.flags.contains(ObjectFlags::INPROGRESS)
    }

    // ---- handler / notification protocol --------------------------------

    /// Registers a waiter. Spec.md §4.D: may not be called from inside a
    /// notification.
    pub fn register_handler(
        &mut self,
        callback: Box<dyn FnMut(WaiterStatus) -> bool + Send>,
    ) -> HandlerId {
        assert!(
            !self.notifying,
            "handler registration is forbidden inside a notification callback"
        );
        let id = HandlerId(self.next_handler_seq);
        self.next_handler_seq += 1;
        self.handlers.push(Handler { id, callback });
        id
    }

    pub fn unregister_handler(&mut self, handle: HandlerId) {
        self.handlers.retain(|h| h.id != handle);
    }

    /// Invokes the callback once with `Cancelled` and unregisters it
    /// (spec.md §4.D `abortHandler`).
    pub fn abort_handler(&mut self, handle: HandlerId) {
        if let Some(pos) = self.handlers.iter().position(|h| h.id == handle) {
            let mut handler = self.handlers.remove(pos);
            (handler.callback)(WaiterStatus::Cancelled);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Walks the handler list invoking each callback with `Progress`
    /// (spec.md §4.D notification protocol). Done handlers (callback
    /// returns `true`) are removed; not-done handlers remain.
    pub fn notify(&mut self) {
        self.notify_with(WaiterStatus::Progress);
    }

    fn notify_with(&mut self, status: WaiterStatus) {
        assert!(!self.notifying, "notifyObject is not re-entrant per-object");
        self.notifying = true;
        self.retain();

        // Self-healing traversal: snapshot ids up front so handlers may
        // unregister themselves or earlier handlers mid-walk, per spec.md
        // §4.D "Self-healing traversal".
        let ids: Vec<HandlerId> = self.handlers.iter().map(|h| h.id).collect();
        let mut done = Vec::new();

        for id in ids {
            let Some(pos) = self.handlers.iter().position(|h| h.id == id) else {
                continue;
            };
            let is_done = (self.handlers[pos].callback)(status.clone());
            if is_done {
                done.push(id);
            }
        }

        self.handlers.retain(|h| !done.contains(&h.id));

        self.notifying = false;
        self.release();
    }

    // ---- metadata --------------------------------------------------------

    /// Spec.md §4.D `metadataChanged`.
    pub fn metadata_changed(&mut self, revalidate: bool) {
        if revalidate {
            trace!("metadata changed: revalidating disk entry headers");
        } else {
            self.flags.remove(ObjectFlags::DISK_ENTRY_COMPLETE);
            trace!("metadata changed: marking disk entry dirty");
        }
    }

    // ---- freshness algorithm --------------------------------------------

    /// `objectIsStale(o, req_cc)` (spec.md §4.D).
    pub fn is_stale(&self, req_cc: &CacheControl, now: i64, cfg: &FreshnessConfig) -> bool {
        if self.flags.contains(ObjectFlags::INITIAL) {
            return false;
        }

        let combined_flags = self.cache_control | req_cc.flags;

        let effective_s_maxage = match (req_cc.s_maxage, self.s_maxage) {
            (a, b) if a >= 0 && b >= 0 => Some(a.min(b)),
            (a, _) if a >= 0 => Some(a),
            (_, b) if b >= 0 => Some(b),
            _ => None,
        };

        let mut t = if cfg.cache_is_shared && effective_s_maxage.is_some() {
            self.age + effective_s_maxage.unwrap()
        } else if req_cc.max_age >= 0 {
            self.age + req_cc.max_age
        } else if self.expires >= 0 {
            let mut t = self.age + cfg.max_expires_age;
            if self.date >= 0 {
                t = t.min(self.age + (self.expires - self.date));
            } else {
                t = t.min(self.expires);
            }
            t
        } else {
            let mut t = self.age + cfg.max_age;
            if self.last_modified >= 0 {
                let scaled =
                    self.age + ((now - self.last_modified) as f64 * cfg.max_age_fraction) as i64;
                t = t.min(scaled);
            } else {
                t = t.min(self.age + cfg.max_no_modified_age);
            }
            t
        };

        let proxy_revalidate_applies =
            combined_flags.contains(CacheControlFlags::MUST_REVALIDATE)
                || (cfg.cache_is_shared && combined_flags.contains(CacheControlFlags::PROXY_REVALIDATE));

        if !proxy_revalidate_applies {
            t = (t - req_cc.min_fresh).min(t + req_cc.max_stale);
        }

        now > t
    }

    /// `objectMustRevalidate(o, req_cc)` (spec.md §4.D).
    pub fn must_revalidate(&self, req_cc: &CacheControl, now: i64, cfg: &FreshnessConfig) -> bool {
        if self.cache_control.intersects(
            CacheControlFlags::NO | CacheControlFlags::NO_HIDDEN | CacheControlFlags::NO_STORE,
        ) {
            return true;
        }
        if cfg.cache_is_shared && self.cache_control.contains(CacheControlFlags::PRIVATE) {
            return true;
        }
        if self.cache_control.contains(CacheControlFlags::VARY) && !cfg.mindlessly_cache_vary {
            return true;
        }
        self.is_stale(req_cc, now, cfg)
    }
}

/// Tunables feeding the freshness algorithm, from spec.md §6's
/// configuration table.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessConfig {
    pub cache_is_shared: bool,
    pub mindlessly_cache_vary: bool,
    pub max_expires_age: i64,
    pub max_age: i64,
    pub max_age_fraction: f64,
    pub max_no_modified_age: i64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            cache_is_shared: false,
            mindlessly_cache_vary: false,
            max_expires_age: 30 * 86400 + 3600,
            max_age: 14 * 86400 + 3600,
            max_age_fraction: 0.1,
            max_no_modified_age: 23 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn test_pool() -> Arc<ChunkPool> {
        ChunkPool::new(16, 64, 40, 50, 60)
    }

    fn test_object() -> Object {
        Object::new(ObjectKind::Http, b"http://a/x".to_vec(), test_pool())
    }

    #[test]
    fn partial_then_add_data_fills_size() {
        let mut o = test_object();
        o.partial(Some(10), None).unwrap();
        o.add_data(b"abcdefghij", 0, 10).unwrap();
        assert_eq!(o.size, 10);
        assert_eq!(o.read(0, 10).unwrap(), b"abcdefghij");
    }

    #[test]
    fn partial_with_shrinking_length_aborts() {
        let mut o = test_object();
        o.add_data(b"abcdefghij", 0, 10).unwrap();
        let err = o.partial(Some(5), None).unwrap_err();
        assert!(matches!(err, ObjectError::InconsistentLength { .. }));
        assert!(o.flags().contains(ObjectFlags::ABORTED));
    }

    #[test]
    fn chunk_middle_write_past_unfilled_prefix_fails() {
        let mut o = test_object();
        o.set_chunks(1);
        let err = o.add_data(b"xyz", 5, 3).unwrap_err();
        assert!(matches!(err, ObjectError::ChunkMiddleWrite { .. }));
    }

    #[test]
    fn hole_size_reports_contiguous_holes() {
        let mut o = test_object();
        o.set_chunks(3);
        // The whole object is one hole that runs to the end of the
        // allocated chunks: how far it extends isn't known yet.
        assert_eq!(o.hole_size(0), UNKNOWN);
        o.add_data(&[1u8; 16], 16, 16).unwrap();
        assert_eq!(o.hole_size(0), 16);
        assert_eq!(o.hole_size(16), 0);
    }

    #[test]
    fn abort_clears_content_and_sets_flag() {
        let mut o = test_object();
        o.add_data(b"abcdefghij", 0, 10).unwrap();
        o.abort(502, Atom::detached(b"Bad Gateway"));
        assert!(o.flags().contains(ObjectFlags::ABORTED));
        assert_eq!(o.code, 502);
        assert_eq!(o.size, 0);
        assert!(!o.is_public());
    }

    #[test]
    fn abort_requires_nonzero_code() {
        let mut o = test_object();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            o.abort(0, Atom::detached(b"x"));
        }));
        assert!(result.is_err());
    }

    #[test]
    fn coalesced_fetch_notifies_all_waiters_once() {
        let mut o = test_object();
        let fired_a = Arc::new(Mutex::new(0));
        let fired_b = Arc::new(Mutex::new(0));

        let fa = fired_a.clone();
        o.register_handler(Box::new(move |status| {
            assert_eq!(status, WaiterStatus::Progress);
            *fa.lock().unwrap() += 1;
            true
        }));
        let fb = fired_b.clone();
        o.register_handler(Box::new(move |status| {
            assert_eq!(status, WaiterStatus::Progress);
            *fb.lock().unwrap() += 1;
            true
        }));

        o.partial(Some(10), None).unwrap();
        o.add_data(b"abcdefghij", 0, 10).unwrap();
        o.set_inprogress(false);

        assert_eq!(*fired_a.lock().unwrap(), 1);
        assert_eq!(*fired_b.lock().unwrap(), 1);
        assert_eq!(o.size, 10);
        assert_eq!(o.handler_count(), 0);
    }

    #[test]
    fn set_inprogress_false_notifies_waiter_complete() {
        let mut o = test_object();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let seen = statuses.clone();
        o.register_handler(Box::new(move |status| {
            seen.lock().unwrap().push(status);
            false
        }));

        o.partial(Some(5), None).unwrap();
        o.add_data(b"abcde", 0, 5).unwrap();
        o.set_inprogress(false);

        assert_eq!(
            *statuses.lock().unwrap(),
            vec![WaiterStatus::Progress, WaiterStatus::Progress, WaiterStatus::Complete]
        );
    }

    #[test]
    fn abort_during_fetch_notifies_waiter_with_status() {
        let mut o = test_object();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        o.register_handler(Box::new(move |status| {
            *seen2.lock().unwrap() = Some(status);
            true
        }));

        o.abort(502, Atom::detached(b"Bad Gateway"));

        assert_eq!(
            *seen.lock().unwrap(),
            Some(WaiterStatus::Aborted {
                code: 502,
                message: "Bad Gateway".to_string()
            })
        );
        assert_eq!(o.size, 0);
        assert!(o.flags().contains(ObjectFlags::ABORTED));
    }

    #[test]
    fn chunk_eviction_then_refill() {
        let mut o = test_object();
        let chunk_size = 16u64;
        let buf = vec![7u8; (chunk_size * 3) as usize];
        o.add_data(&buf, 0, buf.len()).unwrap();

        assert!(o.punch_chunk(1));
        assert_eq!(o.hole_size(chunk_size), chunk_size as i64);

        let refill = vec![9u8; chunk_size as usize];
        o.add_data(&refill, chunk_size, refill.len()).unwrap();
        assert_eq!(o.hole_size(chunk_size), 0);
    }

    #[test]
    fn freshness_expires_path() {
        let o = {
            let mut o = test_object();
            o.flags.remove(ObjectFlags::INITIAL);
            o.date = 1000;
            o.age = 1000;
            o.expires = 1100;
            o
        };
        let req_cc = CacheControl::new();
        let cfg = FreshnessConfig::default();

        assert!(!o.is_stale(&req_cc, 1050, &cfg));
        assert!(o.is_stale(&req_cc, 1101, &cfg));
    }

    #[test]
    fn revalidation_gate_ignores_max_stale() {
        let o = {
            let mut o = test_object();
            o.flags.remove(ObjectFlags::INITIAL);
            o.cache_control = CacheControlFlags::MUST_REVALIDATE;
            o.date = 1000;
            o.age = 1000;
            o.expires = 1100;
            o
        };
        let mut req_cc = CacheControl::new();
        req_cc.max_stale = 1000;
        let cfg = FreshnessConfig::default();

        assert!(o.is_stale(&req_cc, 1101, &cfg));
    }

    #[test]
    fn supersede_during_read_unlocks_and_destroys() {
        let mut o = test_object();
        o.add_data(&[1u8; 16], 0, 16).unwrap();
        o.lock_chunk(0);

        let saw_supersede = Arc::new(Mutex::new(false));
        let saw = saw_supersede.clone();
        o.register_handler(Box::new(move |_status| {
            *saw.lock().unwrap() = true;
            true
        }));

        o.supersede();
        assert!(*saw_supersede.lock().unwrap());
        assert!(o.flags().contains(ObjectFlags::SUPERSEDED));
        assert!(!o.is_public());

        o.unlock_chunk(0);
        assert!(o.release_notify());
        assert!(o.destroyable());
    }
}
