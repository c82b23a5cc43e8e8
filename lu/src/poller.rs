//! Poll driver
//!
//! Ticks on a fixed interval and runs one engine cycle per tick. A tick that
//! lands while the previous cycle is still running is skipped, not queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Clears the busy flag when a cycle ends, even by panic
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Poller {
    engine: Arc<Engine>,
    interval: Duration,
    busy: Arc<AtomicBool>,
    in_flight: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        debug!(?interval, "Poller::new: called");
        Self {
            engine,
            interval,
            busy: Arc::new(AtomicBool::new(false)),
            in_flight: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start a cycle unless one is running; returns true if started
    pub fn try_start(&mut self) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("try_start: previous cycle still running, skipping tick");
            return false;
        }

        let engine = self.engine.clone();
        let guard = BusyGuard(self.busy.clone());
        self.in_flight = Some(tokio::spawn(async move {
            let _guard = guard;
            engine.poll_cycle().await;
        }));
        true
    }

    /// Poll until a shutdown signal arrives, then let the current cycle finish
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> eyre::Result<()> {
        debug!("Poller::run: called");
        info!("Polling every {:?}", self.interval);

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.try_start();
                }

                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if let Some(handle) = self.in_flight.take() {
            debug!("Poller::run: waiting for in-flight cycle");
            if let Err(e) = handle.await {
                warn!(error = %e, "Poll cycle task failed");
            }
        }

        info!("Poller stopped");
        Ok(())
    }
}
