//! Shard LRU demo
//!
//! Builds a cache from the environment, runs a small workload against it,
//! reports telemetry and keeps sweeping until SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shard_lru::{CacheConfig, LruCache};

const WORKLOAD_KEYS: usize = 10_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shard_lru=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::<String, Vec<u8>>::from_env();
    info!(
        shard_count = config.shard_count,
        max_items = config.max_items,
        default_ttl_secs = config.default_ttl_secs,
        cleanup_interval_secs = config.cleanup_interval_secs,
        "configuration loaded"
    );

    let cache = Arc::new(LruCache::with_shutdown(config, shutdown_signal())?);

    run_workload(&cache).await?;

    let telemetry = cache.telemetry().await?;
    info!(
        len = cache.len(),
        hit_rate = telemetry.hit_rate(),
        telemetry = %serde_json::to_string(&telemetry)?,
        "workload finished"
    );

    info!("waiting for shutdown signal");
    shutdown_signal().await;

    cache.close().await;
    info!("shutdown complete");
    Ok(())
}

/// Writes a batch of keys from several tasks, then reads half of them back.
async fn run_workload(cache: &Arc<LruCache<String, Vec<u8>>>) -> anyhow::Result<()> {
    let mut writers = tokio::task::JoinSet::new();
    for worker in 0..4 {
        let cache = Arc::clone(cache);
        writers.spawn(async move {
            for i in (worker..WORKLOAD_KEYS).step_by(4) {
                cache
                    .set_with_ttl(format!("key-{i}"), i.to_be_bytes().to_vec(), 60)
                    .await?;
            }
            Ok::<_, shard_lru::CacheError>(())
        });
    }
    while let Some(result) = writers.join_next().await {
        result.context("writer task panicked")??;
    }

    for i in (0..WORKLOAD_KEYS).step_by(2) {
        if cache.get(&format!("key-{i}")).await?.is_none() {
            warn!(key = i, "key missing after workload");
        }
    }

    // Empty key: derived from the value
    let generated = cache.set(String::new(), b"anonymous".to_vec()).await?;
    info!(%generated, "stored value under generated key");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(%err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}
