//! proxyd - caching HTTP/1.1 forward proxy daemon
//!
//! Starts the Object Store and Cache Coherence Engine, wires up the disk,
//! clock, scheduler, and upstream fetch collaborators, and serves client
//! connections on the configured listen address.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use cache_core::Engine;
use cache_proxy::actor::spawn_engine_actor;
use cache_proxy::config::ProxyConfig;
use cache_proxy::disk::DiskCache;
use cache_proxy::fetch::ReqwestFetchDriver;
use cache_proxy::forbidden::AllowAll;
use cache_proxy::listener;
use cache_proxy::scheduler::TokioScheduler;

#[derive(Parser)]
#[command(
    name = "proxyd",
    author,
    version = env!("CARGO_PKG_VERSION"),
    about = "Caching HTTP/1.1 forward proxy"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => ProxyConfig::load_from(path)?,
        None => ProxyConfig::load()?,
    };

    info!(listen = %config.listen, "starting proxyd");

    let idle_time_secs = config.cache.idle_time_secs;
    let disk = DiskCache::with_dir(config.resolved_disk_cache_dir())
        .map_err(|e| anyhow::anyhow!("failed to initialize disk cache: {}", e))?;
    let engine = Engine::new(config.cache);
    let engine_handle = spawn_engine_actor(engine, disk);

    let fetch_driver: Arc<dyn cache_core::FetchDriver> =
        Arc::new(ReqwestFetchDriver::new(engine_handle.clone()));
    let scheduler = Arc::new(TokioScheduler::new());
    let filter = Arc::new(AllowAll);

    let serve_addr = config.listen;
    let serve_handle = engine_handle.clone();
    let serve_scheduler = scheduler.clone();
    let server = tokio::spawn(async move {
        if let Err(e) =
            listener::serve(serve_addr, serve_handle, fetch_driver, filter, serve_scheduler).await
        {
            error!(error = %e, "listener exited with error");
        }
    });

    let eviction_handle = engine_handle.clone();
    let eviction_scheduler = scheduler.clone();
    let eviction_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(idle_time_secs));
        loop {
            interval.tick().await;
            if eviction_scheduler.work_to_do() {
                continue;
            }
            let stats = eviction_handle.run_eviction(false).await;
            info!(?stats, "ran idle eviction pass");
        }
    });

    tokio::select! {
        _ = server => {}
        _ = eviction_task => {}
        _ = signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
