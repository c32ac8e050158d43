//! Upstream fetch driver — a concrete `FetchDriver` using `reqwest`
//! (already present in the donor's dependency graph for `updater.rs`'s
//! GitHub release checks) to perform the actual GET/conditional-GET and
//! stream bytes into the object via `add_data`.
//!
//! `FetchDriver::request` is a synchronous trait method (the core has no
//! `async` dependency), so it spawns a `tokio` task that drives the actual
//! request and feeds results back through an `EngineHandle`, the same
//! spawn-and-reply shape `scheduler.rs` uses for deferred time events.

use std::time::Duration;

use cache_core::{FetchDriver, ObjectKind};
use reqwest::Client;
use tracing::{debug, warn};

use crate::actor::EngineHandle;

const CHUNK_READ_SIZE: usize = 64 * 1024;

/// `FetchDriver` backed by a shared `reqwest::Client`.
pub struct ReqwestFetchDriver {
    client: Client,
    engine: EngineHandle,
}

impl ReqwestFetchDriver {
    pub fn new(engine: EngineHandle) -> Self {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");
        Self { client, engine }
    }
}

impl FetchDriver for ReqwestFetchDriver {
    fn request(&self, kind: ObjectKind, key: &[u8], from: u64, to: Option<u64>, method: &str) {
        if kind != ObjectKind::Http {
            warn!(?kind, "fetch driver only handles HTTP objects");
            return;
        }

        let url = match std::str::from_utf8(key) {
            Ok(u) => u.to_string(),
            Err(_) => {
                warn!("object key is not valid UTF-8, cannot fetch");
                return;
            }
        };

        let client = self.client.clone();
        let engine = self.engine.clone();
        let method = method.to_string();

        tokio::spawn(async move {
            run_fetch(client, engine, url, from, to, method).await;
        });
    }
}

async fn run_fetch(
    client: Client,
    engine: EngineHandle,
    url: String,
    from: u64,
    to: Option<u64>,
    method: String,
) {
    let id = match engine.find(ObjectKind::Http, url.clone().into_bytes()).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!(%url, "fetch requested for object that no longer exists");
            return;
        }
        Err(e) => {
            warn!(%url, error = %e, "fetch lookup failed");
            return;
        }
    };

    let mut req = match method.as_str() {
        "HEAD" => client.head(&url),
        _ => client.get(&url),
    };

    if from > 0 || to.is_some() {
        let range = match to {
            Some(to) => format!("bytes={}-{}", from, to),
            None => format!("bytes={}-", from),
        };
        req = req.header(reqwest::header::RANGE, range);
    }

    let response = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            engine.abort(id, 502, format!("upstream request failed: {}", e)).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() && status != reqwest::StatusCode::PARTIAL_CONTENT {
        engine
            .abort(id, status.as_u16(), format!("upstream returned {}", status))
            .await;
        return;
    }

    let headers = format_headers(&response);
    let declared_length = response.content_length();
    if let Err(e) = engine.partial(id, declared_length, Some(headers)).await {
        engine.abort(id, 502, format!("bad upstream response shape: {}", e)).await;
        return;
    }

    let mut stream = response.bytes_stream();
    let mut offset = from;
    debug!(%url, "streaming upstream response body");

    loop {
        use futures::StreamExt;
        match stream.next().await {
            Some(Ok(bytes)) => {
                for chunk in bytes.chunks(CHUNK_READ_SIZE) {
                    if let Err(e) = engine.add_data(id, chunk.to_vec(), offset).await {
                        engine.abort(id, 502, format!("cache write failed: {}", e)).await;
                        return;
                    }
                    offset += chunk.len() as u64;
                }
            }
            Some(Err(e)) => {
                engine.abort(id, 502, format!("upstream stream error: {}", e)).await;
                return;
            }
            None => break,
        }
    }

    engine.set_inprogress(id, false).await;
}

fn format_headers(response: &reqwest::Response) -> String {
    let mut out = String::new();
    for (name, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            out.push_str(name.as_str());
            out.push_str(": ");
            out.push_str(v);
            out.push_str("\r\n");
        }
    }
    out
}
