//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired entries out of every
//! shard of a cache.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::{CacheCore, CacheKey, CacheValue};

/// Handle to a running cleanup task.
///
/// Sweeps can be paused and resumed; the task itself runs until
/// [`CleanupScheduler::shutdown`] is called, the external signal it was
/// spawned with completes, or the handle is dropped.
#[derive(Debug)]
pub struct CleanupScheduler {
    active: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupScheduler {
    /// Spawns the sweep loop on `runtime`. The first sweep runs one
    /// `interval` after spawning.
    pub(crate) fn spawn<K, V, F>(
        runtime: &Handle,
        core: Arc<CacheCore<K, V>>,
        interval: Duration,
        signal: F,
    ) -> Self
    where
        K: CacheKey,
        V: CacheValue,
        F: Future<Output = ()> + Send + 'static,
    {
        let (active, mut active_rx) = watch::channel(true);
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let logging = core.logging_enabled();

        let handle = runtime.spawn(async move {
            if logging {
                info!(
                    interval_secs = interval.as_secs(),
                    "cache started the cleanup process"
                );
            }

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sweeping = *active_rx.borrow_and_update();
            tokio::pin!(signal);

            loop {
                tokio::select! {
                    changed = active_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        sweeping = *active_rx.borrow_and_update();
                    }
                    _ = ticker.tick() => {
                        if !sweeping {
                            continue;
                        }
                        let removed = core.cleanup_shards().await;
                        if logging {
                            if removed > 0 {
                                info!(removed, "cleanup removed expired entries");
                            } else {
                                debug!("cleanup found no expired entries");
                            }
                        }
                    }
                    _ = async { shutdown_rx.wait_for(|closed| *closed).await.is_ok() } => break,
                    _ = &mut signal => break,
                }
            }

            if logging {
                info!("cache stopped the cleanup process");
            }
        });

        Self {
            active,
            shutdown,
            handle,
        }
    }

    /// Pauses (`false`) or resumes (`true`) periodic sweeps.
    pub fn set_active(&self, active: bool) {
        self.active.send_replace(active);
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Ends the task after any in-flight sweep completes.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
