//! Bridges the single-threaded `Engine` to the multi-threaded `tokio`
//! runtime, the same impedance-matching problem `bridge.rs` solves for
//! FUSE: one side needs a request/reply shape, the other owns a mutable
//! resource that cannot be shared across threads.
//!
//! Unlike `bridge.rs`, there is no sync/async boundary to cross here — both
//! sides are `tokio` tasks — so a plain `tokio::sync::mpsc` channel replaces
//! `bridge.rs`'s `crossbeam_channel`, per SPEC_FULL.md §5.

use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use cache_core::{
    CacheControl, Engine, EvictionStats, HandlerId, ObjectError, ObjectKind, StoreError,
    WaiterStatus,
};

use crate::disk::DiskCache;

/// One request for the engine-owning task to perform. Every variant carries
/// a `oneshot` reply channel except fire-and-forget notifications.
pub enum EngineCommand {
    Find {
        kind: ObjectKind,
        key: Vec<u8>,
        reply: oneshot::Sender<Result<Option<cache_core::ObjectId>, StoreError>>,
    },
    Make {
        kind: ObjectKind,
        key: Vec<u8>,
        public: bool,
        reply: oneshot::Sender<Result<cache_core::ObjectId, StoreError>>,
    },
    Partial {
        id: cache_core::ObjectId,
        declared_length: Option<u64>,
        headers: Option<String>,
        reply: oneshot::Sender<Result<(), ObjectError>>,
    },
    AddData {
        id: cache_core::ObjectId,
        data: Vec<u8>,
        offset: u64,
        reply: oneshot::Sender<Result<(), ObjectError>>,
    },
    SetInProgress {
        id: cache_core::ObjectId,
        inprogress: bool,
    },
    Abort {
        id: cache_core::ObjectId,
        code: u16,
        message: String,
    },
    Read {
        id: cache_core::ObjectId,
        offset: u64,
        len: u64,
        reply: oneshot::Sender<Option<Vec<u8>>>,
    },
    RegisterHandler {
        id: cache_core::ObjectId,
        callback: Box<dyn FnMut(WaiterStatus) -> bool + Send>,
        reply: oneshot::Sender<Option<HandlerId>>,
    },
    Release {
        id: cache_core::ObjectId,
    },
    IsStale {
        id: cache_core::ObjectId,
        req_cc: CacheControl,
        now: i64,
        reply: oneshot::Sender<Option<bool>>,
    },
    RunEviction {
        force: bool,
        reply: oneshot::Sender<EvictionStats>,
    },
}

/// Cloneable front for sending commands into the engine-owning task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub async fn find(&self, kind: ObjectKind, key: Vec<u8>) -> Result<Option<cache_core::ObjectId>, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Find { kind, key, reply }).await;
        rx.await.unwrap_or(Ok(None))
    }

    pub async fn make(&self, kind: ObjectKind, key: Vec<u8>, public: bool) -> Result<cache_core::ObjectId, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Make { kind, key, public, reply }).await;
        rx.await.unwrap_or(Err(StoreError::AtCapacity))
    }

    pub async fn partial(
        &self,
        id: cache_core::ObjectId,
        declared_length: Option<u64>,
        headers: Option<String>,
    ) -> Result<(), ObjectError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Partial { id, declared_length, headers, reply }).await;
        rx.await.unwrap_or(Ok(()))
    }

    pub async fn add_data(&self, id: cache_core::ObjectId, data: Vec<u8>, offset: u64) -> Result<(), ObjectError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::AddData { id, data, offset, reply }).await;
        rx.await.unwrap_or(Ok(()))
    }

    pub async fn set_inprogress(&self, id: cache_core::ObjectId, inprogress: bool) {
        self.send(EngineCommand::SetInProgress { id, inprogress }).await;
    }

    pub async fn abort(&self, id: cache_core::ObjectId, code: u16, message: String) {
        self.send(EngineCommand::Abort { id, code, message }).await;
    }

    pub async fn read(&self, id: cache_core::ObjectId, offset: u64, len: u64) -> Option<Vec<u8>> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Read { id, offset, len, reply }).await;
        rx.await.ok().flatten()
    }

    pub async fn register_handler(
        &self,
        id: cache_core::ObjectId,
        callback: Box<dyn FnMut(WaiterStatus) -> bool + Send>,
    ) -> Option<HandlerId> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RegisterHandler { id, callback, reply }).await;
        rx.await.ok().flatten()
    }

    pub async fn release(&self, id: cache_core::ObjectId) {
        self.send(EngineCommand::Release { id }).await;
    }

    pub async fn is_stale(&self, id: cache_core::ObjectId, req_cc: CacheControl, now: i64) -> Option<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::IsStale { id, req_cc, now, reply }).await;
        rx.await.ok().flatten()
    }

    pub async fn run_eviction(&self, force: bool) -> EvictionStats {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RunEviction { force, reply }).await;
        rx.await.unwrap_or_default()
    }

    async fn send(&self, cmd: EngineCommand) {
        if self.tx.send(cmd).await.is_err() {
            error!("engine actor task has shut down; command dropped");
        }
    }
}

/// Spawns the task that owns the `Engine` for its entire lifetime and
/// processes `EngineCommand`s one at a time, returning a cloneable
/// `EngineHandle` for the rest of the daemon to talk to it through.
pub fn spawn_engine_actor(mut engine: Engine, disk: DiskCache) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineCommand>(256);

    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                EngineCommand::Find { kind, key, reply } => {
                    let _ = reply.send(engine.find(kind, &key));
                }
                EngineCommand::Make { kind, key, public, reply } => {
                    let _ = reply.send(engine.make(kind, &key, public));
                }
                EngineCommand::Partial { id, declared_length, headers, reply } => {
                    let result = match engine.object_mut(id) {
                        Some(obj) => obj.partial(declared_length, headers),
                        None => Ok(()),
                    };
                    let _ = reply.send(result);
                }
                EngineCommand::AddData { id, data, offset, reply } => {
                    let result = match engine.object_mut(id) {
                        Some(obj) => obj.add_data(&data, offset, data.len()),
                        None => Ok(()),
                    };
                    let _ = reply.send(result);
                }
                EngineCommand::SetInProgress { id, inprogress } => {
                    if let Some(obj) = engine.object_mut(id) {
                        obj.set_inprogress(inprogress);
                    }
                }
                EngineCommand::Abort { id, code, message } => {
                    engine.abort(id, code, message);
                }
                EngineCommand::Read { id, offset, len, reply } => {
                    let result = engine.object(id).and_then(|obj| obj.read(offset, len as usize));
                    let _ = reply.send(result);
                }
                EngineCommand::RegisterHandler { id, callback, reply } => {
                    let result = engine.object_mut(id).map(|obj| obj.register_handler(callback));
                    let _ = reply.send(result);
                }
                EngineCommand::Release { id } => {
                    engine.release(id);
                }
                EngineCommand::IsStale { id, req_cc, now, reply } => {
                    let _ = reply.send(engine.is_stale(id, &req_cc, now));
                }
                EngineCommand::RunEviction { force, reply } => {
                    let stats = engine.run_eviction(&disk, force);
                    let _ = reply.send(stats);
                }
            }
        }
        warn!("engine actor task exiting: all handles dropped");
    });

    EngineHandle { tx }
}
