//! Error types for the caching engine
//!
//! Mirrors spec.md §7's five error categories: resource exhaustion, protocol
//! violation, upstream failure, cancellation, and programmer error. The
//! first four are represented as ordinary `Result` values; the fifth is an
//! `assert!`/`debug_assert!` at the call site, never a `Result`, since those
//! are genuine invariant violations rather than runtime-observable failures.

use thiserror::Error;

/// Errors returned by `Object` mutation operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// The chunk pool had no buffers to give out (§7.1).
    #[error("chunk pool exhausted")]
    PoolExhausted,

    /// `partial` was called with a `length` smaller than the object's
    /// current `size` (§4.D `partial`, §7.2).
    #[error("inconsistent content-length: declared {declared}, already have {have}")]
    InconsistentLength { declared: u64, have: u64 },

    /// `addData` targeted the middle of a chunk whose filled prefix does
    /// not yet reach the write offset (§4.D chunk-middle write rule, §7.2).
    #[error("write at offset {offset} falls past the unwritten prefix of chunk {chunk}")]
    ChunkMiddleWrite { chunk: usize, offset: u64 },

    /// `abort` was called with a zero status code, which spec.md's
    /// precondition forbids.
    #[error("abort requires a non-zero status code")]
    ZeroAbortCode,
}

/// Errors returned by `ObjectStore` operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Object key exceeded the 10000-byte limit from spec.md §3.
    #[error("object key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    /// `make` hit `objectHighMark` even after a synchronous eviction pass.
    #[error("object store at capacity")]
    AtCapacity,
}

/// Status observed by a waiter's callback on notification.
///
/// This is the Rust replacement for the C source's sign-encoded
/// `(code, errno)` pair described in spec.md §9 Design Notes: a proper sum
/// type at the handler boundary instead of overloading the sign bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaiterStatus {
    /// The object made forward progress; more bytes (or metadata) may now
    /// be available. Corresponds to `cb(0, handler)` in the source.
    Progress,
    /// The fetch driver finished populating the object and cleared
    /// `INPROGRESS`; the object will not grow further under this fetch.
    Complete,
    /// The object was aborted with an upstream/protocol status code and
    /// message.
    Aborted { code: u16, message: String },
    /// The handler was cancelled by its owner via `abort_handler` rather
    /// than by the object itself. Corresponds to the source's `cb(-1, h)`.
    Cancelled,
}
