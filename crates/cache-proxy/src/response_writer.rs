//! Streams whatever portion of an object is already filled back to the
//! client as bytes arrive, polling `Object::read` and parking on a
//! registered waiter handle when it catches up to a hole — the "coalesced
//! fetch" / incremental-delivery behavior from spec.md §1.

use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

use cache_core::{HandlerId, ObjectId, WaiterStatus};

use crate::actor::EngineHandle;

const POLL_CHUNK: u64 = 64 * 1024;

/// Streams object `id`'s bytes to `out` from offset 0 until the object's
/// fetch completes (successfully or aborted), registering a waiter so this
/// task sleeps rather than busy-polls while waiting on upstream bytes.
pub async fn stream_response<W: AsyncWriteExt + Unpin>(
    out: &mut W,
    engine: &EngineHandle,
    id: ObjectId,
) -> std::io::Result<()> {
    let mut offset = 0u64;
    let mut wrote_headers = false;

    loop {
        if !wrote_headers {
            // Real status-line/header framing is left to a full HTTP
            // implementation; spec.md's Non-goals exclude full HTTP parsing
            // from this crate's scope, so a minimal 200 is emitted here and
            // the cached header blob (if any) is appended by the caller
            // when wiring this up to a real HTTP front end.
            out.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await?;
            wrote_headers = true;
        }

        match engine.read(id, offset, POLL_CHUNK).await {
            Some(bytes) if !bytes.is_empty() => {
                out.write_all(&bytes).await?;
                offset += bytes.len() as u64;
            }
            _ => {
                if wait_for_more_or_done(engine, id).await {
                    break;
                }
            }
        }
    }

    out.flush().await
}

/// Registers a one-shot waiter on the object and blocks this task until
/// either more bytes are available or the object finishes (successfully or
/// aborted). Returns `true` when the caller should stop streaming.
async fn wait_for_more_or_done(engine: &EngineHandle, id: ObjectId) -> bool {
    let (tx, rx) = oneshot::channel::<WaiterStatus>();
    let tx = std::sync::Mutex::new(Some(tx));

    let handler_id: Option<HandlerId> = engine
        .register_handler(
            id,
            Box::new(move |status| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(status);
                }
                false
            }),
        )
        .await;

    if handler_id.is_none() {
        // Object already gone; nothing more to stream.
        return true;
    }

    match rx.await {
        Ok(WaiterStatus::Complete) => true,
        Ok(WaiterStatus::Aborted { .. }) => true,
        Ok(WaiterStatus::Cancelled) => true,
        Ok(WaiterStatus::Progress) => false,
        Err(_) => true,
    }
}
