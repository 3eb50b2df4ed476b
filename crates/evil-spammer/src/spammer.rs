// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use strum_macros::Display;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use evil_wallet::EvilWallet;

use crate::config::SpammerConfig;
use crate::errors::{errors_summary, ErrorCounter, SpamError, SpamErrorKind};
use crate::metrics::SpammerMetrics;
use crate::spamming_functions::{spam_function, SpamFunction};

/// Pace and limits of a spam run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub tick: Duration,
    pub duration: Duration,
    pub max_units: u64,
    pub max_in_flight: usize,
    pub log_interval: Duration,
}

impl From<&SpammerConfig> for Schedule {
    fn from(config: &SpammerConfig) -> Self {
        Self {
            tick: config.tick(),
            duration: config.duration,
            max_units: config.max_units(),
            max_in_flight: config.max_in_flight,
            log_interval: config.log_interval,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum StopReason {
    Deadline,
    Cancelled,
    MaxUnits,
    /// No spendable outputs left.
    Exhausted,
}

#[derive(Clone, Debug)]
pub struct SpamSummary {
    pub units_dispatched: u64,
    pub units_prepared: u64,
    pub items_sent: u64,
    pub duration: Duration,
    pub stop_reason: StopReason,
    pub errors: BTreeMap<SpamErrorKind, u64>,
}

impl SpamSummary {
    /// Prepared units per second.
    pub fn rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.units_prepared as f64 / secs
    }
}

impl fmt::Display for SpamSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Spam stopped ({}) after {:.1}s: {} units dispatched, {} prepared, {} blocks sent, {:.2} units/s",
            self.stop_reason,
            self.duration.as_secs_f64(),
            self.units_dispatched,
            self.units_prepared,
            self.items_sent,
            self.rate()
        )?;
        write!(f, "{}", errors_summary(&self.errors))
    }
}

#[derive(Default)]
struct Progress {
    prepared: AtomicU64,
    sent: AtomicU64,
}

/// Starts spam units at a fixed rate until the run ends, then waits for the units in
/// flight.
pub struct Spammer {
    wallet: Arc<EvilWallet>,
    spam_function: Arc<dyn SpamFunction>,
    schedule: Schedule,
    errors: Arc<ErrorCounter>,
    metrics: Arc<SpammerMetrics>,
    span: Span,
}

impl Spammer {
    pub fn new(
        wallet: Arc<EvilWallet>,
        spam_function: Arc<dyn SpamFunction>,
        schedule: Schedule,
        metrics: Arc<SpammerMetrics>,
    ) -> Self {
        Self {
            wallet,
            spam_function,
            schedule,
            errors: Arc::new(ErrorCounter::new()),
            metrics,
            span: info_span!("spammer"),
        }
    }

    pub fn from_config(
        config: &SpammerConfig,
        wallet: Arc<EvilWallet>,
        metrics: Arc<SpammerMetrics>,
    ) -> Result<Self, SpamError> {
        config.validate()?;
        let spam_function = spam_function(config, &wallet)?;
        Ok(Self::new(wallet, spam_function, config.into(), metrics))
    }

    pub fn errors(&self) -> &Arc<ErrorCounter> {
        &self.errors
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Run until the duration elapses, `cancel` fires, the unit limit is reached or the
    /// wallets run out of funds.
    pub async fn spam(&self, cancel: CancellationToken) -> SpamSummary {
        let schedule = &self.schedule;
        info!(
            tick = ?schedule.tick,
            duration = ?schedule.duration,
            max_units = schedule.max_units,
            "starting spam"
        );
        let start = Instant::now();
        let progress = Arc::new(Progress::default());
        let exhausted = CancellationToken::new();
        let in_flight = Arc::new(Semaphore::new(schedule.max_in_flight));
        let tracker = TaskTracker::new();
        let mut dispatched = 0u64;

        let deadline = sleep(schedule.duration);
        tokio::pin!(deadline);
        let mut ticker = interval(schedule.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut log_ticker = interval_at(start + schedule.log_interval, schedule.log_interval);

        let stop_reason = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                _ = exhausted.cancelled() => break StopReason::Exhausted,
                _ = &mut deadline => break StopReason::Deadline,
                _ = log_ticker.tick() => {
                    info!(
                        dispatched,
                        prepared = progress.prepared.load(Ordering::Relaxed),
                        sent = progress.sent.load(Ordering::Relaxed),
                        in_flight = schedule.max_in_flight - in_flight.available_permits(),
                        errors = self.errors.total(),
                        "spam progress"
                    );
                }
                _ = ticker.tick() => {
                    let Ok(permit) = in_flight.clone().try_acquire_owned() else {
                        debug!("in-flight limit reached, skipping tick");
                        continue;
                    };
                    dispatched += 1;
                    self.dispatch(&tracker, permit, progress.clone(), exhausted.clone());
                    if dispatched >= schedule.max_units {
                        break StopReason::MaxUnits;
                    }
                }
            }
        };

        info!(%stop_reason, "waiting for units in flight");
        tracker.close();
        tracker.wait().await;
        if let Some(output_wallet) = self.spam_function.output_wallet() {
            self.wallet.output_manager().wait_pending_registrations().await;
            self.wallet.set_wallet_ready(output_wallet);
        }

        let summary = SpamSummary {
            units_dispatched: dispatched,
            units_prepared: progress.prepared.load(Ordering::Relaxed),
            items_sent: progress.sent.load(Ordering::Relaxed),
            duration: start.elapsed(),
            stop_reason,
            errors: self.errors.snapshot(),
        };
        info!("{summary}");
        summary
    }

    fn dispatch(
        &self,
        tracker: &TaskTracker,
        permit: OwnedSemaphorePermit,
        progress: Arc<Progress>,
        exhausted: CancellationToken,
    ) {
        let wallet = self.wallet.clone();
        let spam_function = self.spam_function.clone();
        let errors = self.errors.clone();
        let metrics = self.metrics.clone();
        metrics.units_dispatched.inc();
        metrics.units_in_flight.inc();
        tracker.spawn(
            async move {
                match spam_function.spam(&wallet, &errors).await {
                    Ok(sent) => {
                        progress.prepared.fetch_add(1, Ordering::Relaxed);
                        progress.sent.fetch_add(sent as u64, Ordering::Relaxed);
                        metrics.units_prepared.inc();
                        metrics.items_sent.inc_by(sent as u64);
                    }
                    Err(e) => {
                        if e.is_exhaustion() {
                            warn!("out of funds, stopping spam");
                            exhausted.cancel();
                        } else {
                            debug!("spam unit failed: {e}");
                        }
                        errors.count_error(&e);
                        metrics.record_error(&e);
                    }
                }
                metrics.units_in_flight.dec();
                drop(permit);
            }
            .instrument(self.span.clone()),
        );
    }
}
