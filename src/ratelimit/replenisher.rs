//! Background task that restores gate capacity at every window boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::gate::WindowGate;

/// Something the replenisher tops off on every tick.
pub trait Replenish: Send + Sync + 'static {
    /// Restore full capacity for a new window.
    fn replenish(&self);
}

impl Replenish for WindowGate {
    fn replenish(&self) {
        WindowGate::replenish(self);
    }
}

#[derive(Debug, Default)]
struct ReplenisherStats {
    ticks: AtomicU64,
    restarts: AtomicU64,
}

/// Periodic replenishment task owned by a client.
///
/// The first tick fires one full period after [`spawn`](Self::spawn), then
/// once per period. Ticks never overlap. If a tick panics the task is
/// restarted, so the gate cannot silently drain. The task stops on
/// [`shutdown`](Self::shutdown) or when the `Replenisher` is dropped.
#[derive(Debug)]
pub struct Replenisher {
    period: Duration,
    shutdown: watch::Sender<bool>,
    supervisor: Option<JoinHandle<()>>,
    stats: Arc<ReplenisherStats>,
}

impl Replenisher {
    /// Start replenishing `target` every `period`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<R>(target: Arc<R>, period: Duration) -> Self
    where
        R: Replenish + ?Sized,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ReplenisherStats::default());

        info!(period = ?period, "Starting replenisher");
        let supervisor = tokio::spawn(supervise(
            target,
            period,
            shutdown_rx,
            Arc::clone(&stats),
        ));

        Self {
            period,
            shutdown,
            supervisor: Some(supervisor),
            stats,
        }
    }

    /// Replenishment period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.stats.ticks.load(Ordering::Relaxed)
    }

    /// Number of times the tick task was restarted after a panic.
    pub fn restarts(&self) -> u64 {
        self.stats.restarts.load(Ordering::Relaxed)
    }

    /// Whether the background task is still alive.
    pub fn is_running(&self) -> bool {
        self.supervisor
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Replenisher did not shut down cleanly");
            }
        }
        info!(ticks = self.ticks(), "Replenisher stopped");
    }
}

impl Drop for Replenisher {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
    }
}

/// Run the tick loop, restarting it whenever it panics.
async fn supervise<R>(
    target: Arc<R>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
    stats: Arc<ReplenisherStats>,
) where
    R: Replenish + ?Sized,
{
    loop {
        let ticker = tokio::spawn(run_ticks(
            Arc::clone(&target),
            period,
            shutdown.clone(),
            Arc::clone(&stats),
        ));

        match ticker.await {
            Ok(()) => return,
            Err(e) if e.is_panic() => {
                let restarts = stats.restarts.fetch_add(1, Ordering::Relaxed) + 1;
                error!(restarts = restarts, "Replenisher tick panicked, restarting");
                if *shutdown.borrow() {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

async fn run_ticks<R>(
    target: Arc<R>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<ReplenisherStats>,
) where
    R: Replenish + ?Sized,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                target.replenish();
                let ticks = stats.ticks.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(ticks = ticks, "Replenisher tick");
            }
            changed = shutdown.changed() => {
                // A dropped sender means the owner is gone.
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
