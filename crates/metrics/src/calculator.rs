use std::sync::{Arc, Mutex};
use std::time::Duration;

use kman_core::config::MetricsConfig;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::manager::UdMetricManager;

/// Outcome of one calculation round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalculationRound {
    pub calculated: usize,
    pub failed: usize,
}

/// Calls `calculate_value` on every registered metric at a fixed rate, the
/// first time half an interval after [`start`](Self::start).
pub struct ScheduledMetricCalculator {
    manager: Arc<UdMetricManager>,
    interval: Duration,
    shutdown: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledMetricCalculator {
    pub fn new(manager: Arc<UdMetricManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            shutdown: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    pub fn from_config(manager: Arc<UdMetricManager>, config: &MetricsConfig) -> Self {
        Self::new(manager, config.calculation_interval())
    }

    /// One round over every metric. A failing metric is logged and skipped.
    pub fn calculate(&self) -> CalculationRound {
        let mut round = CalculationRound::default();
        for (name, metric) in self.manager.calculated_metrics() {
            match metric.calculate_value() {
                Ok(()) => round.calculated += 1,
                Err(e) => {
                    warn!(metric = %name, error = %e, "Failed to calculate value for schedule-calculated metric");
                    round.failed += 1;
                }
            }
        }
        debug!(calculated = round.calculated, failed = round.failed, "Metric calculation round done");
        round
    }

    /// Spawn the schedule on the current runtime. No-op when already running.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().unwrap();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let this = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { this.run().await }));
        info!(interval = ?self.interval, "Metric calculator started");
    }

    /// Stop the schedule and wait for the loop to exit.
    pub async fn stop(&self) {
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            self.shutdown.notify_one();
            let _ = handle.await;
            info!("Metric calculator stopped");
        }
    }

    async fn run(&self) {
        let mut ticker = interval_at(Instant::now() + self.interval / 2, self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.calculate();
                }
                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }
    }
}

impl Drop for ScheduledMetricCalculator {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}
