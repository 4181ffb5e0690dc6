//! Background trigger loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::dispatch::Transport;

use super::SyncCoordinator;

/// Lets the host request a pass from outside the app's foreground, e.g. an
/// OS background task. Optional; timer and connectivity triggers run without it.
#[derive(Debug, Clone, Default)]
pub struct BackgroundWake {
    notify: Arc<Notify>,
}

impl BackgroundWake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a pass. Wake-ups arriving while one is pending collapse into one.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    async fn woken(&self) {
        self.notify.notified().await;
    }
}

/// Owns the running background loop. Dropping it also stops the loop.
#[derive(Debug)]
pub struct SyncHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the loop, waiting for an in-progress pass to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(error) = (&mut self.task).await {
            tracing::warn!("Sync loop ended abnormally: {error}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the loop on the current tokio runtime.
///
/// Triggers: connectivity becoming online, the periodic timer (which also
/// runs maintenance), and the optional host wake-up.
pub fn spawn<T: Transport>(
    coordinator: Arc<SyncCoordinator<T>>,
    wake: Option<BackgroundWake>,
) -> SyncHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run(coordinator, wake, shutdown_rx));
    SyncHandle {
        shutdown: Some(shutdown_tx),
        task,
    }
}

async fn run<T: Transport>(
    coordinator: Arc<SyncCoordinator<T>>,
    wake: Option<BackgroundWake>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut online = coordinator.connectivity().subscribe();
    let mut period = coordinator.settings().sync_interval;
    let mut ticker = period.map(new_ticker);
    tracing::info!("Sync loop started (interval: {period:?})");

    coordinator.run_pass().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Ok(()) = online.changed() => {
                if *online.borrow_and_update() {
                    coordinator.run_pass().await;
                }
            }
            () = next_tick(&mut ticker) => {
                if let Err(error) = coordinator.maintain() {
                    tracing::warn!("Queue maintenance failed: {error}");
                }
                coordinator.run_pass().await;
            }
            () = woken(wake.as_ref()) => {
                tracing::debug!("Host wake-up");
                coordinator.run_pass().await;
            }
        }

        let desired = coordinator.settings().sync_interval;
        if desired != period {
            tracing::info!("Sync interval changed to {desired:?}");
            period = desired;
            ticker = period.map(new_ticker);
        }
    }

    tracing::info!("Sync loop stopped");
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn woken(wake: Option<&BackgroundWake>) {
    match wake {
        Some(wake) => wake.woken().await,
        None => std::future::pending().await,
    }
}
