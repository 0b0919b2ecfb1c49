//! Periodic keep-alive
//!
//! Failures are logged and counted; they never stop the schedule.

use crate::config::nonzero_interval;
use crate::error::ClientResult;
use crate::session::SessionManager;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Something that can be pinged
#[async_trait]
pub trait HeartbeatTarget: Send + Sync {
    async fn beat(&self) -> ClientResult<()>;
}

#[async_trait]
impl HeartbeatTarget for SessionManager {
    async fn beat(&self) -> ClientResult<()> {
        self.heartbeat().await
    }
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    failures: AtomicU64,
}

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct HeartbeatScheduler {
    target: Arc<dyn HeartbeatTarget>,
    counters: Arc<Counters>,
    running: Mutex<Option<Running>>,
}

impl HeartbeatScheduler {
    pub fn new(target: Arc<dyn HeartbeatTarget>) -> Self {
        Self {
            target,
            counters: Arc::new(Counters::default()),
            running: Mutex::new(None),
        }
    }

    /// Start ticking every `interval`, first tick immediately
    ///
    /// A schedule that is already running is replaced.
    pub async fn start(&self, interval: Duration) {
        self.stop().await;
        let interval = nonzero_interval("heartbeat_interval", interval);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(
            self.target.clone(),
            self.counters.clone(),
            interval,
            shutdown.clone(),
        ));
        *self.running.lock() = Some(Running { shutdown, handle });
        tracing::info!(interval_ms = interval.as_millis() as u64, "Heartbeat started");
    }

    /// Cancel and wait for the ticker. Safe to call when not running.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { shutdown, handle }) = running {
            shutdown.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Heartbeat task ended abnormally");
            }
            tracing::info!("Heartbeat stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Completed ticks, successful or not
    pub fn ticks(&self) -> u64 {
        self.counters.ticks.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.counters.failures.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for HeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatScheduler")
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .field("failures", &self.failures())
            .finish_non_exhaustive()
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.shutdown.cancel();
        }
    }
}

async fn tick_loop(
    target: Arc<dyn HeartbeatTarget>,
    counters: Arc<Counters>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = target.beat() => result,
        };

        counters.ticks.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(()) => tracing::debug!("Heartbeat sent"),
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Heartbeat failed");
            }
        }
    }
}
