//! Client-facing TCP listener and minimal HTTP/1.1 request-line reader.
//!
//! This is daemon-level plumbing, not core (spec.md's Non-goals explicitly
//! exclude full HTTP parsing from the caching engine itself). It reads just
//! enough of a request to build an `ObjectKey` — method plus absolute URI —
//! and hands it to the engine actor, then streams the response back via
//! `response_writer`.
//!
//! Framing follows the donor's manual line-oriented approach in
//! `net.rs`'s `recv_message` (read, validate, then act), adapted here to
//! `tokio::io::BufReader` + `AsyncBufReadExt::read_line` instead of a
//! length-prefixed binary frame, since the wire format here is HTTP/1.1
//! text, not the donor's `NetMessage` codec.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use cache_core::{FetchDriver, ObjectKind};

use crate::actor::EngineHandle;
use crate::forbidden::UrlFilter;
use crate::response_writer;
use crate::scheduler::TokioScheduler;

const MAX_HEADER_LINES: usize = 256;
const MAX_LINE_LEN: usize = 8192;

#[derive(Debug)]
pub struct ParsedRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub enum ListenerError {
    Io(String),
    MalformedRequestLine(String),
    TooManyHeaders,
    LineTooLong,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Io(e) => write!(f, "I/O error: {}", e),
            ListenerError::MalformedRequestLine(l) => write!(f, "malformed request line: {}", l),
            ListenerError::TooManyHeaders => write!(f, "too many header lines"),
            ListenerError::LineTooLong => write!(f, "header line too long"),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Reads one HTTP/1.1 request line + headers from `stream`. Stops at the
/// blank line that terminates the header block; does not read any body.
pub async fn read_request<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
) -> Result<ParsedRequest, ListenerError> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .map_err(|e| ListenerError::Io(e.to_string()))?;
    let line = line.trim_end();
    if line.len() > MAX_LINE_LEN {
        return Err(ListenerError::LineTooLong);
    }

    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ListenerError::MalformedRequestLine(line.to_string()))?
        .to_string();
    let uri = parts
        .next()
        .ok_or_else(|| ListenerError::MalformedRequestLine(line.to_string()))?
        .to_string();

    let mut headers = Vec::new();
    loop {
        if headers.len() > MAX_HEADER_LINES {
            return Err(ListenerError::TooManyHeaders);
        }
        let mut header_line = String::new();
        reader
            .read_line(&mut header_line)
            .await
            .map_err(|e| ListenerError::Io(e.to_string()))?;
        let trimmed = header_line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(ParsedRequest { method, uri, headers })
}

/// Accepts connections on `addr` forever, spawning one task per connection.
pub async fn serve(
    addr: SocketAddr,
    engine: EngineHandle,
    fetch: Arc<dyn FetchDriver>,
    filter: Arc<dyn UrlFilter>,
    scheduler: Arc<TokioScheduler>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening for client connections");

    loop {
        let (stream, peer) = listener.accept().await?;
        let engine = engine.clone();
        let fetch = fetch.clone();
        let filter = filter.clone();
        let busy = scheduler.busy_flag();

        tokio::spawn(async move {
            busy.store(true, Ordering::Relaxed);
            if let Err(e) = handle_connection(stream, peer, engine, fetch, filter).await {
                warn!(%peer, error = %e, "connection handling failed");
            }
            busy.store(false, Ordering::Relaxed);
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    engine: EngineHandle,
    fetch: Arc<dyn FetchDriver>,
    filter: Arc<dyn UrlFilter>,
) -> Result<(), ListenerError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request = read_request(&mut reader).await?;
    debug!(%peer, method = %request.method, uri = %request.uri, "accepted request");

    if !filter.is_allowed(&request.uri) {
        write_half
            .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
            .await
            .map_err(|e| ListenerError::Io(e.to_string()))?;
        return Ok(());
    }

    let key = request.uri.clone().into_bytes();
    let id = match engine.find(ObjectKind::Http, key.clone()).await {
        Ok(Some(id)) => id,
        Ok(None) => match engine.make(ObjectKind::Http, key.clone(), true).await {
            Ok(id) => {
                engine.set_inprogress(id, true).await;
                fetch.request(ObjectKind::Http, &key, 0, None, &request.method);
                id
            }
            Err(e) => {
                error!(%peer, error = %e, "failed to create object");
                return Err(ListenerError::Io(e.to_string()));
            }
        },
        Err(e) => return Err(ListenerError::Io(e.to_string())),
    };

    response_writer::stream_response(&mut write_half, &engine, id)
        .await
        .map_err(|e| ListenerError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn parses_get_request_line_and_headers() {
        let raw = b"GET http://example.com/a HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n";
        let mut reader = BufReader::new(Cursor::new(raw.to_vec()));
        let parsed = read_request(&mut reader).await.unwrap();

        assert_eq!(parsed.method, "GET");
        assert_eq!(parsed.uri, "http://example.com/a");
        assert_eq!(parsed.headers.len(), 2);
        assert_eq!(parsed.headers[0], ("Host".to_string(), "example.com".to_string()));
    }

    #[tokio::test]
    async fn rejects_request_line_missing_uri() {
        let raw = b"GET\r\n\r\n";
        let mut reader = BufReader::new(Cursor::new(raw.to_vec()));
        assert!(read_request(&mut reader).await.is_err());
    }
}
