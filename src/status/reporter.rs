// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Heartbeat loop keeping the AddonInstance status in sync with the addon's health.
//!
//! A single control loop owns the cached conditions and the heartbeat interval.
//! Callers never touch that state; they hand updates to the loop over a channel
//! and wait until the loop has taken them. Every hand-off is a rendezvous: the
//! loop acknowledges each signal through a oneshot, and a caller that gives up
//! closes its oneshot first so the loop discards the signal instead of applying it.

use crate::config::ReporterConfig;
use crate::error::ReporterError;
use crate::kubernetes::{InstanceKey, InstanceStore};
use crate::status::update::{push_conditions, restore_conditions};
use crate::types::{AddonInstance, HealthCondition};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Updates that callers hand to the control loop
#[derive(Debug)]
enum Update {
    /// Conditions already written to the store by the sender
    Conditions(Vec<HealthCondition>),
    /// A new heartbeat period from the AddonInstance spec
    Interval(Duration),
}

#[derive(Debug)]
struct Signal {
    update: Update,
    accepted: oneshot::Sender<()>,
}

/// Why a hand-off did not complete
enum HandOff {
    Cancelled,
    Stopped,
}

enum LoopState {
    Stopped,
    Starting,
    Running(LoopHandle),
}

struct LoopHandle {
    signals: mpsc::Sender<Signal>,
    shutdown: CancellationToken,
    exited: watch::Receiver<bool>,
}

/// Reports the addon's health to its AddonInstance.
///
/// Construct one per process and share it behind an `Arc`. `start` runs the
/// heartbeat loop until its token is cancelled or `stop` is called; the other
/// operations may be called concurrently from any task.
pub struct StatusReporter {
    store: Arc<dyn InstanceStore>,
    key: InstanceKey,
    config: ReporterConfig,
    state: Mutex<LoopState>,
}

impl StatusReporter {
    pub fn new(
        store: Arc<dyn InstanceStore>,
        key: InstanceKey,
        config: ReporterConfig,
    ) -> Result<Self, ReporterError> {
        config.validate()?;
        Ok(Self {
            store,
            key,
            config,
            state: Mutex::new(LoopState::Stopped),
        })
    }

    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), LoopState::Running(_))
    }

    /// Run the heartbeat loop until `ctx` is cancelled or `stop` is called.
    ///
    /// Fails without side effects when a loop is already active, and fails
    /// leaving the reporter stopped when the AddonInstance cannot be read.
    #[instrument(skip(self, ctx), fields(instance = %self.key))]
    pub async fn start(&self, ctx: CancellationToken) -> Result<(), ReporterError> {
        {
            let mut state = self.lock_state();
            if !matches!(*state, LoopState::Stopped) {
                return Err(ReporterError::AlreadyRunning);
            }
            *state = LoopState::Starting;
        }

        let (exited_tx, exited_rx) = watch::channel(false);
        let _guard = LoopGuard {
            state: &self.state,
            exited: exited_tx,
        };

        let instance = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(ReporterError::Cancelled("start")),
            fetched = self.store.get(&self.key) => fetched.map_err(|source| {
                ReporterError::RemoteFetchFailed {
                    operation: "start",
                    key: self.key.clone(),
                    source,
                }
            })?,
        };

        let (signals_tx, signals_rx) = mpsc::channel(1);
        let shutdown = ctx.child_token();
        *self.lock_state() = LoopState::Running(LoopHandle {
            signals: signals_tx,
            shutdown: shutdown.clone(),
            exited: exited_rx,
        });

        let interval = instance.heartbeat_period_or(self.config.default_interval);
        info!(interval = ?interval, "StatusReporter started");

        let result = self.run(interval, signals_rx, shutdown).await;
        match &result {
            Ok(()) => info!("StatusReporter stopped"),
            Err(e) => warn!(error = %e, "StatusReporter stopped with error"),
        }
        result
    }

    /// Request the loop to exit and wait for it to do so.
    ///
    /// Only call this on a reporter presumed running; a stopped reporter
    /// answers with [`ReporterError::Stopped`].
    pub async fn stop(&self) -> Result<(), ReporterError> {
        let (shutdown, mut exited) = match &*self.lock_state() {
            LoopState::Running(handle) => (handle.shutdown.clone(), handle.exited.clone()),
            _ => return Err(ReporterError::Stopped("stop")),
        };

        shutdown.cancel();

        // A closed channel means the loop guard is gone, which also counts as exited
        let wait = async move {
            let _ = exited.wait_for(|done| *done).await;
        };
        match tokio::time::timeout(self.config.stop_timeout, wait).await {
            Ok(()) => {
                debug!("StatusReporter acknowledged stop");
                Ok(())
            }
            Err(_) => Err(ReporterError::StopTimeout(self.config.stop_timeout)),
        }
    }

    /// Write `conditions` to the AddonInstance right away, then hand them to
    /// the loop to be re-sent on every heartbeat.
    ///
    /// When `ctx` is cancelled before the loop takes the conditions, the stored
    /// conditions are rolled back to what they were before this call.
    #[instrument(skip(self, ctx, conditions), fields(instance = %self.key, count = conditions.len()))]
    pub async fn set_conditions(
        &self,
        ctx: &CancellationToken,
        conditions: Vec<HealthCondition>,
    ) -> Result<(), ReporterError> {
        const OPERATION: &str = "set conditions";

        let signals = self.signal_sender().ok_or(ReporterError::Stopped(OPERATION))?;
        if ctx.is_cancelled() {
            return Err(ReporterError::Cancelled(OPERATION));
        }

        let pushed = push_conditions(
            self.store.as_ref(),
            &self.key,
            &conditions,
            self.config.conflict_retries,
            OPERATION,
        )
        .await?;

        match hand_off(ctx, &signals, Update::Conditions(conditions)).await {
            Ok(()) => Ok(()),
            Err(HandOff::Stopped) => Err(ReporterError::Stopped(OPERATION)),
            Err(HandOff::Cancelled) => {
                warn!("Cancelled before the loop took the conditions, rolling back");
                restore_conditions(
                    self.store.as_ref(),
                    &self.key,
                    pushed.previous,
                    self.config.conflict_retries,
                    self.config.rollback_timeout,
                )
                .await
                .map_err(|e| ReporterError::RollbackFailed {
                    operation: OPERATION,
                    source: Box::new(e),
                })?;
                Err(ReporterError::Cancelled(OPERATION))
            }
        }
    }

    /// Tell the loop about a changed AddonInstance spec. Only the heartbeat
    /// period is taken from it; nothing is written to the store.
    #[instrument(skip(self, ctx, instance), fields(instance = %self.key))]
    pub async fn report_instance_spec_change(
        &self,
        ctx: &CancellationToken,
        instance: &AddonInstance,
    ) -> Result<(), ReporterError> {
        const OPERATION: &str = "report instance spec change";

        let signals = self.signal_sender().ok_or(ReporterError::Stopped(OPERATION))?;

        let interval = instance.heartbeat_period_or(self.config.default_interval);
        hand_off(ctx, &signals, Update::Interval(interval))
            .await
            .map_err(|e| match e {
                HandOff::Cancelled => ReporterError::Cancelled(OPERATION),
                HandOff::Stopped => ReporterError::Stopped(OPERATION),
            })
    }

    async fn run(
        &self,
        interval: Duration,
        mut signals: mpsc::Receiver<Signal>,
        shutdown: CancellationToken,
    ) -> Result<(), ReporterError> {
        let mut heartbeat = Heartbeat::new(interval, self.config.initial_conditions.clone());

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                Some(signal) = signals.recv() => {
                    if signal.accepted.send(()).is_ok() {
                        heartbeat.apply(signal.update);
                    } else {
                        debug!("Discarding update abandoned by its sender");
                    }
                }
                _ = heartbeat.ticker.tick() => self.beat(&mut heartbeat).await?,
            }
        }
    }

    /// Push the cached conditions. Failures are retried on the next tick unless
    /// the configured limit of consecutive failures is reached.
    async fn beat(&self, heartbeat: &mut Heartbeat) -> Result<(), ReporterError> {
        match push_conditions(
            self.store.as_ref(),
            &self.key,
            &heartbeat.latest,
            self.config.conflict_retries,
            "heartbeat",
        )
        .await
        {
            Ok(pushed) => {
                heartbeat.failures = 0;
                debug!("Heartbeat sent");
                let interval = pushed.instance.heartbeat_period_or(self.config.default_interval);
                heartbeat.set_interval(interval);
                Ok(())
            }
            Err(e) => {
                heartbeat.failures += 1;
                warn!(
                    error = %e,
                    failures = heartbeat.failures,
                    "Heartbeat failed, retrying on next tick"
                );
                match self.config.max_consecutive_failures {
                    Some(max) if heartbeat.failures >= max => {
                        Err(ReporterError::HeartbeatsExhausted {
                            failures: heartbeat.failures,
                            source: Box::new(e),
                        })
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    fn signal_sender(&self) -> Option<mpsc::Sender<Signal>> {
        match &*self.lock_state() {
            LoopState::Running(handle) => Some(handle.signals.clone()),
            _ => None,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LoopState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<LoopState>) -> MutexGuard<'_, LoopState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loop-local state, owned by the control loop only
struct Heartbeat {
    interval: Duration,
    ticker: Interval,
    latest: Vec<HealthCondition>,
    failures: u32,
}

impl Heartbeat {
    fn new(interval: Duration, latest: Vec<HealthCondition>) -> Self {
        Self {
            interval,
            ticker: ticker(interval),
            latest,
            failures: 0,
        }
    }

    fn apply(&mut self, update: Update) {
        match update {
            Update::Conditions(conditions) => {
                debug!(count = conditions.len(), "Cached new conditions");
                self.latest = conditions;
            }
            Update::Interval(interval) => self.set_interval(interval),
        }
    }

    /// Re-arm the timer so the next beat is one new period from now
    fn set_interval(&mut self, interval: Duration) {
        if interval == self.interval {
            return;
        }
        info!(from = ?self.interval, to = ?interval, "Heartbeat interval changed");
        self.interval = interval;
        self.ticker = ticker(interval);
    }
}

/// First tick one full period from now
fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn hand_off(
    ctx: &CancellationToken,
    signals: &mpsc::Sender<Signal>,
    update: Update,
) -> Result<(), HandOff> {
    let (accepted_tx, mut accepted_rx) = oneshot::channel();
    let signal = Signal {
        update,
        accepted: accepted_tx,
    };

    let sent = tokio::select! {
        biased;
        _ = ctx.cancelled() => None,
        sent = signals.send(signal) => Some(sent),
    };
    match sent {
        None => return Err(HandOff::Cancelled),
        Some(Err(_)) => return Err(HandOff::Stopped),
        Some(Ok(())) => {}
    }

    let accepted = tokio::select! {
        biased;
        accepted = &mut accepted_rx => Some(accepted),
        _ = ctx.cancelled() => None,
    };
    if let Some(accepted) = accepted {
        return accepted.map_err(|_| HandOff::Stopped);
    }

    // Cancelled while queued. Closing first decides the race with the loop:
    // either it already took the signal or it will find the slot closed.
    accepted_rx.close();
    match accepted_rx.try_recv() {
        Ok(()) => Ok(()),
        Err(_) => Err(HandOff::Cancelled),
    }
}

/// Marks the reporter stopped when the loop exits, however it exits
struct LoopGuard<'a> {
    state: &'a Mutex<LoopState>,
    exited: watch::Sender<bool>,
}

impl Drop for LoopGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = LoopState::Stopped;
        self.exited.send_replace(true);
    }
}
