//! Streaming loop.
//!
//! Samples a reading, pushes it down the link and pauses, once per tick,
//! until cancelled or until too many consecutive sends have failed.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thermolink_hw::link::protocol;
use thermolink_hw::{Error, Transport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::sensors::ReadingSource;

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link yet. Initial state.
    Disconnected,
    /// Link open, last send succeeded.
    Connected,
    /// Link open, at least one send failed since the last success.
    Degraded,
    /// Loop finished and link closed. Terminal.
    Stopped,
}

/// Consecutive failure counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    count: u32,
    max: u32,
}

impl ErrorBudget {
    /// Creates an empty budget allowing `max` consecutive failures.
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    /// Records a failure. Returns true once the budget is exhausted.
    pub fn charge(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.is_exhausted()
    }

    /// Clears the failure count.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Returns true when no further failures are allowed.
    pub fn is_exhausted(&self) -> bool {
        self.count >= self.max
    }

    /// Current consecutive failure count.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Failure limit.
    pub fn max(&self) -> u32 {
        self.max
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stop was requested through the cancellation token.
    Cancelled,
    /// `failures` consecutive ticks failed.
    BudgetExhausted { failures: u32 },
}

/// Loop timing and logging settings.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Pause after a normal tick.
    pub interval: Duration,
    /// Pause after an anomalous or faulted tick.
    pub anomaly_interval: Duration,
    /// How long to wait for a reply after a send.
    pub response_grace: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_errors: u32,
    /// Log every Nth successful send at info level.
    pub log_every: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            anomaly_interval: Duration::from_secs(2),
            response_grace: Duration::from_millis(100),
            max_errors: 10,
            log_every: 1,
        }
    }
}

/// Result of a single tick.
#[derive(Debug)]
enum Tick {
    Sent,
    Failed(Error),
    Anomaly,
}

/// Periodic sample-and-send session over an open transport.
pub struct StreamingLoop<S, T> {
    source: S,
    transport: T,
    settings: LoopSettings,
    budget: ErrorBudget,
    state: SessionState,
    successes: u64,
    attempts: u64,
}

impl<S, T> StreamingLoop<S, T>
where
    S: ReadingSource,
    T: Transport,
{
    /// Creates a loop over a reading source and a transport.
    pub fn new(source: S, transport: T, settings: LoopSettings) -> Self {
        let state = if transport.is_connected() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        };
        Self {
            source,
            transport,
            budget: ErrorBudget::new(settings.max_errors),
            settings,
            state,
            successes: 0,
            attempts: 0,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current error budget.
    pub fn budget(&self) -> ErrorBudget {
        self.budget
    }

    /// Number of send attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs until cancelled or until the error budget is exhausted.
    ///
    /// Requires an open transport; otherwise returns `Error::NotConnected`
    /// without touching the session state. The transport is closed on
    /// every other exit path.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<StopReason, Error> {
        if !self.transport.is_connected() {
            error!("No connection to the display");
            return Err(Error::NotConnected);
        }

        self.state = SessionState::Connected;
        info!("Streaming started");

        let reason = loop {
            let tick = AssertUnwindSafe(self.tick()).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                outcome = tick => outcome,
            };

            let pause = match outcome {
                Ok(Tick::Sent) => self.settings.interval,
                Ok(Tick::Anomaly) => self.settings.anomaly_interval,
                Ok(Tick::Failed(e)) => {
                    if self.charge_failure(&e.to_string()) {
                        break self.exhausted();
                    }
                    self.settings.interval
                }
                Err(panic) => {
                    if self.charge_failure(&panic_message(panic.as_ref())) {
                        break self.exhausted();
                    }
                    self.settings.anomaly_interval
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                _ = tokio::time::sleep(pause) => {}
            }
        };

        if reason == StopReason::Cancelled {
            info!("Stop requested");
        }
        self.stop();
        Ok(reason)
    }

    /// Closes the transport and enters `Stopped`. Idempotent.
    pub fn stop(&mut self) {
        self.transport.close();
        if self.state != SessionState::Stopped {
            self.state = SessionState::Stopped;
            info!("Streaming stopped");
        }
    }

    async fn tick(&mut self) -> Tick {
        let reading = self.source.read().await;
        if !reading.is_valid() {
            warn!("Invalid reading {:?}, retrying after a longer pause", reading);
            return Tick::Anomaly;
        }

        self.attempts += 1;
        if let Err(e) = self.transport.send(&reading.wire_line()).await {
            return Tick::Failed(e);
        }

        self.budget.reset();
        self.state = SessionState::Connected;
        self.successes += 1;

        let sampled_at = reading.timestamp.format("%H:%M:%S");
        if logs_success(self.successes, self.settings.log_every) {
            info!(
                "[{}] CPU: {:.1}°C, Load: {:.1}% ({})",
                sampled_at, reading.temperature_celsius, reading.load_percent, reading.source
            );
        } else {
            debug!(
                "[{}] CPU: {:.1}°C, Load: {:.1}% ({})",
                sampled_at, reading.temperature_celsius, reading.load_percent, reading.source
            );
        }

        if let Some(response) = self
            .transport
            .read_response(self.settings.response_grace)
            .await
        {
            if protocol::is_error_response(&response) {
                warn!("Display: {}", response);
            } else {
                debug!("Display: {}", response);
            }
        }

        Tick::Sent
    }

    /// Charges the budget for a failed tick. Returns true when exhausted.
    fn charge_failure(&mut self, cause: &str) -> bool {
        let exhausted = self.budget.charge();
        self.state = SessionState::Degraded;
        warn!(
            "Send failed ({}/{}): {}",
            self.budget.count(),
            self.budget.max(),
            cause
        );
        exhausted
    }

    fn exhausted(&self) -> StopReason {
        error!(
            "Giving up after {} consecutive failures",
            self.budget.count()
        );
        StopReason::BudgetExhausted {
            failures: self.budget.count(),
        }
    }
}

/// Whether the `successes`-th successful send is logged at info level.
fn logs_success(successes: u64, log_every: u32) -> bool {
    successes > 0 && successes % u64::from(log_every.max(1)) == 0
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("tick panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("tick panicked: {}", s)
    } else {
        "tick panicked".to_string()
    }
}
