//! Tick scheduling.
//!
//! The loop runs at a fixed target rate. Each iteration measures the real
//! time elapsed since the previous one and then sleeps for whatever is left
//! of the period. Missed time is never replayed: under load the effective
//! rate drops instead of bursting.

use std::time::Duration;

use tokio::time::Instant;

/// Wall-clock bookkeeping for the tick loop.
#[derive(Debug, Clone)]
pub struct TickClock {
    period: Duration,
    last: Instant,
}

impl TickClock {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self { period, last: now }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts an iteration at `now` and returns seconds since the previous one.
    pub fn begin(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last);
        self.last = now;
        dt.as_secs_f32()
    }

    /// Sleep owed after an iteration that took `work`.
    pub fn sleep_after(&self, work: Duration) -> Duration {
        self.period.saturating_sub(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_measured_between_iterations() {
        let start = Instant::now();
        let mut clock = TickClock::new(Duration::from_millis(33), start);
        let dt = clock.begin(start + Duration::from_millis(50));
        assert!((dt - 0.05).abs() < 1e-6);
        assert_eq!(clock.begin(start + Duration::from_millis(50)), 0.0);
    }

    #[test]
    fn sleep_never_goes_negative() {
        let clock = TickClock::new(Duration::from_millis(33), Instant::now());
        assert_eq!(
            clock.sleep_after(Duration::from_millis(10)),
            Duration::from_millis(23)
        );
        assert_eq!(clock.sleep_after(Duration::from_millis(80)), Duration::ZERO);
    }
}
