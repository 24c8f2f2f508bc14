//! The poll/publish loop.
//!
//! Each cycle fetches every metric from the controller and publishes one
//! message per metric. A failed fetch or publish is logged and the loop moves
//! on to waiting; only cancellation ends it.

use crate::config::Settings;
use crate::econet::MetricSource;
use crate::mqtt::MessagePublisher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Polling,
    Publishing,
    Waiting,
    Stopping,
    Stopped,
}

/// Outcome of a single poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetch_failed: bool,
    pub published: usize,
    pub failed: usize,
}

pub struct Poller<'a, S: ?Sized, P: ?Sized> {
    settings: &'a Settings,
    source: &'a S,
    publisher: &'a P,
    state: LoopState,
}

impl<'a, S, P> Poller<'a, S, P>
where
    S: MetricSource + ?Sized,
    P: MessagePublisher + ?Sized,
{
    pub fn new(settings: &'a Settings, source: &'a S, publisher: &'a P) -> Self {
        Self {
            settings,
            source,
            publisher,
            state: LoopState::Starting,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn enter(&mut self, state: LoopState) {
        debug!(from = ?self.state, to = ?state, "poll loop transition");
        self.state = state;
    }

    /// Poll once and publish whatever was read. Leaves the loop in `Waiting`.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        self.enter(LoopState::Polling);
        info!("polling ecoNET endpoint");
        let readings = match self.source.fetch().await {
            Ok(readings) => readings,
            Err(e) => {
                warn!(endpoint = %self.source.describe(), error = %e, "failed to fetch data from ecoNET endpoint");
                report.fetch_failed = true;
                self.enter(LoopState::Waiting);
                return report;
            }
        };

        self.enter(LoopState::Publishing);
        let mut summary = Vec::with_capacity(readings.len());
        for reading in &readings {
            let topic = self.settings.state_topic(reading.name());
            let payload = reading.payload();
            match self
                .publisher
                .publish(&topic, payload.clone().into_bytes(), false)
                .await
            {
                Ok(()) => {
                    debug!(topic = %topic, payload = %payload, "published metric");
                    summary.push(format!("{}={}", reading.name(), payload));
                    report.published += 1;
                }
                Err(e) => {
                    warn!(metric = reading.name(), topic = %topic, error = %e, "failed to publish metric");
                    report.failed += 1;
                }
            }
        }

        if summary.is_empty() {
            warn!("no values were published");
        } else {
            info!("published values: {}", summary.join(", "));
        }

        self.enter(LoopState::Waiting);
        report
    }

    /// Run cycles until `shutdown` is cancelled. Cancellation is observed
    /// between cycles and interrupts the wait immediately; a cycle already in
    /// progress is allowed to finish. Returns the number of cycles run.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> u64 {
        let interval = self.settings.poll_interval;
        info!(interval_secs = interval.as_secs(), "poll loop started");

        let mut cycles = 0;
        while !shutdown.is_cancelled() {
            self.run_cycle().await;
            cycles += 1;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.enter(LoopState::Stopping);
        info!(cycles, "poll loop stopping");
        self.enter(LoopState::Stopped);
        cycles
    }
}
