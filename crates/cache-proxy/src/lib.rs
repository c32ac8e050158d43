//! Cache Proxy - caching HTTP/1.1 forward proxy daemon
//!
//! This crate provides:
//! - The concrete collaborator implementations (`disk`, `clock`,
//!   `scheduler`, `fetch`) that `cache-core`'s `Engine` is driven by
//! - The engine-owning actor task bridging the single-threaded core to the
//!   multi-threaded `tokio` runtime
//! - A minimal client-facing HTTP/1.1 listener and response streamer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Listener tasks (one per connection)             │
//! │  parse request line, stream response bytes incrementally     │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ tokio::sync::mpsc
//!                               │ (EngineCommand + oneshot reply)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Engine actor task (single-owner)            │
//! │  cache_core::Engine — chunk pool, atom table, object store,  │
//! │  eviction engine. No locks, no atomics, &mut self throughout. │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ DiskCollaborator / FetchDriver
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        disk.rs (content-addressed cache) / fetch.rs          │
//! │                  (reqwest upstream client)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actor;
pub mod clock;
pub mod config;
pub mod disk;
pub mod fetch;
pub mod forbidden;
pub mod listener;
pub mod response_writer;
pub mod scheduler;

pub use actor::{spawn_engine_actor, EngineCommand, EngineHandle};
pub use clock::SystemClock;
pub use config::ProxyConfig;
pub use disk::DiskCache;
pub use fetch::ReqwestFetchDriver;
pub use forbidden::{AllowAll, UrlFilter};
pub use scheduler::TokioScheduler;
