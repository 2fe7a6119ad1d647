//! Global delivery-attempt gate.

use std::time::Duration;

use tokio::time::{self, Interval, MissedTickBehavior};

/// Default spacing between admitted deliveries.
pub const DEFAULT_RATE_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic gate admitting at most one delivery per interval.
///
/// The first call is admitted immediately. After an idle period exactly one
/// admission is available straight away; ticks missed while idle do not
/// accumulate into a burst. Call [`RateGate::reset`] once a delivery ends so
/// the next admission is a full period after its last attempt.
#[derive(Debug)]
pub struct RateGate {
    interval: Interval,
}

impl RateGate {
    /// A zero period is raised to one millisecond.
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Wait until the next tick.
    pub async fn admit(&mut self) {
        self.interval.tick().await;
    }

    /// Restart the period from now.
    pub fn reset(&mut self) {
        self.interval.reset();
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}
