//! MonitorActor - drives the sampling pipeline on a fixed period
//!
//! ```text
//! Timer tick → sample → evaluate alerts → persist (best effort) → publish energy_update
//! ```
//!
//! Ticks never overlap: the actor handles its ticker and its commands in a single loop, so
//! a tick (including every store call it makes) finishes before the next one can begin. A
//! slow tick delays the following one instead of causing a burst.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::TickResult;
use crate::alerts::AlertEngine;
use crate::broadcaster::Broadcaster;
use crate::sampling::{Sampler, SamplingError};
use crate::storage::StorageBackend;

use super::messages::{MonitorCommand, MonitorStats};

/// Store one tick's data, logging and counting each failed call
///
/// Every call is attempted regardless of earlier failures. Returns the number of calls
/// that failed.
pub async fn persist_tick(storage: &dyn StorageBackend, tick: &TickResult) -> u64 {
    let mut failures = 0;

    if let Err(e) = storage.store_reading(&tick.reading).await {
        error!("failed to store reading {}: {}", tick.reading.id, e);
        failures += 1;
    }

    if let Err(e) = storage.store_circuit_readings(&tick.circuits).await {
        error!(
            "failed to store circuit readings for {}: {}",
            tick.reading.id, e
        );
        failures += 1;
    }

    for alert in &tick.alerts {
        if let Err(e) = storage.store_alert(alert).await {
            error!("failed to store alert {}: {}", alert.id, e);
            failures += 1;
        }
    }

    failures
}

fn sampling_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub struct MonitorActor {
    sampler: Sampler,

    broadcaster: Broadcaster,

    command_rx: mpsc::Receiver<MonitorCommand>,

    shutdown: CancellationToken,

    period: Duration,

    /// Gates the periodic ticker; only changed by Start and Stop
    enabled: bool,

    stats: MonitorStats,
}

impl MonitorActor {
    pub fn new(
        sampler: Sampler,
        broadcaster: Broadcaster,
        period: Duration,
        command_rx: mpsc::Receiver<MonitorCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sampler,
            broadcaster,
            command_rx,
            shutdown,
            period,
            enabled: false,
            stats: MonitorStats::default(),
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until the cancellation token fires or every handle has been dropped.
    #[instrument(skip(self), name = "monitor")]
    pub async fn run(mut self) {
        debug!("starting monitor actor");

        let mut ticker = sampling_ticker(self.period);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!("shutdown requested");
                    break;
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(MonitorCommand::Start { respond_to }) => {
                        if !self.enabled {
                            debug!("monitoring enabled");
                            self.enabled = true;
                            ticker.reset_immediately();
                        }
                        let _ = respond_to.send(self.stats());
                    }

                    Some(MonitorCommand::Stop { respond_to }) => {
                        if self.enabled {
                            debug!("monitoring disabled");
                            self.enabled = false;
                        }
                        let _ = respond_to.send(self.stats());
                    }

                    Some(MonitorCommand::TickNow { respond_to }) => {
                        let result = self.run_tick().await;
                        let _ = respond_to.send(result);
                    }

                    Some(MonitorCommand::UpdatePeriod { period_ms }) => {
                        if period_ms == 0 {
                            warn!("ignoring zero sampling period");
                        } else {
                            debug!("updating period to {period_ms}ms");
                            self.period = Duration::from_millis(period_ms);
                            ticker = sampling_ticker(self.period);
                        }
                    }

                    Some(MonitorCommand::GetStats { respond_to }) => {
                        let _ = respond_to.send(self.stats());
                    }

                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                },

                _ = ticker.tick(), if self.enabled => {
                    // failures are logged and counted inside run_tick
                    let _ = self.run_tick().await;
                }
            }
        }

        debug!("monitor actor stopped");
    }

    fn stats(&self) -> MonitorStats {
        MonitorStats {
            enabled: self.enabled,
            period_ms: self.period.as_millis() as u64,
            ..self.stats.clone()
        }
    }

    async fn run_tick(&mut self) -> Result<TickResult, SamplingError> {
        let (reading, circuits) = match self.sampler.tick().await {
            Ok(sample) => sample,
            Err(e) => {
                error!("tick skipped: {}", e);
                self.stats.ticks_failed += 1;
                return Err(e);
            }
        };

        let alerts = AlertEngine::evaluate(&reading, &circuits);
        if !alerts.is_empty() {
            debug!("{} alerts raised for {}", alerts.len(), reading.id);
        }

        let tick = TickResult {
            reading,
            circuits,
            alerts,
        };

        let failures = persist_tick(self.sampler.storage().as_ref(), &tick).await;

        self.stats.ticks_completed += 1;
        self.stats.alerts_raised += tick.alerts.len() as u64;
        self.stats.persistence_failures += failures;
        self.stats.last_tick = Some(tick.reading.timestamp);

        let receivers = self.broadcaster.publish(tick.clone());
        trace!("published tick {} to {} subscribers", tick.reading.id, receivers);

        Ok(tick)
    }
}

/// Handle for controlling a MonitorActor
///
/// Cloneable; the actor stops once `shutdown` is called or every handle is dropped.
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
    shutdown: CancellationToken,
    /// Cancelled once the actor task has exited
    stopped: CancellationToken,
}

impl MonitorHandle {
    /// Spawn the actor with monitoring disabled; call [`MonitorHandle::start`] to begin ticking
    pub fn spawn(sampler: Sampler, broadcaster: Broadcaster, period: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let shutdown = CancellationToken::new();

        let stopped = CancellationToken::new();

        let actor = MonitorActor::new(sampler, broadcaster, period, cmd_rx, shutdown.clone());
        let exited = stopped.clone().drop_guard();
        tokio::spawn(async move {
            let _exited = exited;
            actor.run().await;
        });

        Self {
            sender: cmd_tx,
            shutdown,
            stopped,
        }
    }

    pub async fn start(&self) -> Result<MonitorStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::Start { respond_to: tx })
            .await
            .context("failed to send Start command")?;
        rx.await.context("failed to receive response")
    }

    pub async fn stop(&self) -> Result<MonitorStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::Stop { respond_to: tx })
            .await
            .context("failed to send Stop command")?;
        rx.await.context("failed to receive response")
    }

    /// Run a tick immediately and return what it produced
    pub async fn tick_now(&self) -> Result<TickResult> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::TickNow { respond_to: tx })
            .await
            .context("failed to send TickNow command")?;

        Ok(rx.await.context("failed to receive response")??)
    }

    pub async fn update_period(&self, period_ms: u64) -> Result<()> {
        self.sender
            .send(MonitorCommand::UpdatePeriod { period_ms })
            .await
            .context("failed to send UpdatePeriod command")?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<MonitorStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;
        rx.await.context("failed to receive response")
    }

    /// Stop the actor; a tick in progress completes first
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait until the actor task has exited, including any tick it was running
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }
}
