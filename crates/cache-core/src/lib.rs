//! Cache Core — the Object Store and Cache Coherence Engine.
//!
//! This crate contains the foundational, single-threaded caching
//! algorithm: no networking, no filesystem access, no async runtime
//! dependency beyond defining the collaborator traits `cache-proxy`
//! implements concretely.

pub mod atom;
pub mod cache_control;
pub mod chunk_pool;
pub mod collaborator;
pub mod config;
pub mod engine;
pub mod error;
pub mod eviction;
pub mod object;
pub mod store;

pub use atom::{Atom, AtomTable};
pub use cache_control::{CacheControl, CacheControlFlags};
pub use chunk_pool::{ChunkPool, PoolPressure, PooledChunk};
pub use collaborator::{Clock, DiskCollaborator, FetchDriver, Scheduler, TimeEventHandle};
pub use config::CacheConfig;
pub use engine::Engine;
pub use error::{ObjectError, StoreError, WaiterStatus};
pub use eviction::{EvictionConfig, EvictionEngine, EvictionStats};
pub use object::{FreshnessConfig, HandlerId, Object, ObjectFlags, ObjectKind};
pub use store::{ObjectId, ObjectKey, ObjectStore, MAX_KEY_SIZE};
