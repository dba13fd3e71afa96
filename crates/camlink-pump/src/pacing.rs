//! Inter-fetch timing.
//!
//! | Config | Model | First fetch | Next fetch |
//! |---|---|---|---|
//! | `limited`, rate R | fixed rate | immediately | `origin + n / R` |
//! | unlimited | fixed delay | after 100 ms warm-up | 1 ms after the previous cycle completed |
//!
//! Fixed-rate deadlines are absolute, so a slow fetch does not push every
//! later fetch back: when a cycle overruns its slot the next deadline is
//! already in the past and fires at once, and the count over a long window
//! stays at `R` per second.

use std::time::{Duration, Instant};

use camlink_core::{CamlinkError, PacingConfig};

/// Warm-up before the first unlimited fetch.
pub const UNLIMITED_WARMUP: Duration = Duration::from_millis(100);
/// Gap between unlimited fetches; keeps the worker off a hot spin.
pub const UNLIMITED_MIN_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    FixedRate { period: Duration },
    FixedDelay { warmup: Duration, delay: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    mode: Mode,
}

impl PacingPolicy {
    pub fn new(config: &PacingConfig) -> Result<Self, CamlinkError> {
        config.validate()?;
        let mode = if config.limited {
            Mode::FixedRate { period: config.frame_interval() }
        } else {
            Mode::FixedDelay { warmup: UNLIMITED_WARMUP, delay: UNLIMITED_MIN_DELAY }
        };
        Ok(Self { mode })
    }

    pub fn is_fixed_rate(&self) -> bool {
        matches!(self.mode, Mode::FixedRate { .. })
    }

    /// Nominal gap between fetches: `1 / rate` when limited, the minimal
    /// delay otherwise.
    pub fn next_delay(&self) -> Duration {
        match self.mode {
            Mode::FixedRate { period } => period,
            Mode::FixedDelay { delay, .. } => delay,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        match self.mode {
            Mode::FixedRate { .. } => Duration::ZERO,
            Mode::FixedDelay { warmup, .. } => warmup,
        }
    }

    pub fn schedule(&self, origin: Instant) -> Schedule {
        Schedule { policy: *self, origin, ticks: 0 }
    }
}

/// Deadline generator for one run of the worker loop.
#[derive(Debug, Clone)]
pub struct Schedule {
    policy: PacingPolicy,
    origin: Instant,
    ticks:  u64,
}

impl Schedule {
    pub fn first_deadline(&self) -> Instant {
        self.origin + self.policy.initial_delay()
    }

    /// Deadline for the cycle after the one that finished at `completed_at`.
    pub fn next_deadline(&mut self, completed_at: Instant) -> Instant {
        match self.policy.mode {
            Mode::FixedRate { period } => {
                self.ticks += 1;
                let offset = period.as_nanos().saturating_mul(self.ticks as u128);
                self.origin + Duration::from_nanos(offset.min(u64::MAX as u128) as u64)
            }
            Mode::FixedDelay { delay, .. } => completed_at + delay,
        }
    }

    /// Restart the fixed-rate grid at `now` (after the device was unavailable),
    /// so missed slots are not replayed as a burst.
    pub fn rebase(&mut self, now: Instant) {
        self.origin = now;
        self.ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_uses_rate_period_without_initial_delay() {
        let policy = PacingPolicy::new(&PacingConfig::limited(20.0)).unwrap();
        assert!(policy.is_fixed_rate());
        assert_eq!(policy.next_delay(), Duration::from_millis(50));
        assert_eq!(policy.initial_delay(), Duration::ZERO);
    }

    #[test]
    fn unlimited_has_warmup_and_minimal_delay() {
        let policy = PacingPolicy::new(&PacingConfig::unlimited()).unwrap();
        assert!(!policy.is_fixed_rate());
        assert_eq!(policy.initial_delay(), Duration::from_millis(100));
        assert_eq!(policy.next_delay(), Duration::from_millis(1));
    }

    #[test]
    fn invalid_rate_is_rejected() {
        assert!(PacingPolicy::new(&PacingConfig::limited(-1.0)).is_err());
    }

    #[test]
    fn fixed_rate_deadlines_ignore_cycle_duration() {
        let origin = Instant::now();
        let policy = PacingPolicy::new(&PacingConfig::limited(10.0)).unwrap();
        let mut schedule = policy.schedule(origin);
        assert_eq!(schedule.first_deadline(), origin);

        // First cycle overran by 250 ms; deadlines stay on the 100 ms grid.
        let late = origin + Duration::from_millis(250);
        assert_eq!(schedule.next_deadline(late), origin + Duration::from_millis(100));
        assert_eq!(schedule.next_deadline(late), origin + Duration::from_millis(200));
        assert_eq!(schedule.next_deadline(late), origin + Duration::from_millis(300));
    }

    #[test]
    fn fixed_delay_counts_from_completion() {
        let origin = Instant::now();
        let policy = PacingPolicy::new(&PacingConfig::unlimited()).unwrap();
        let mut schedule = policy.schedule(origin);
        assert_eq!(schedule.first_deadline(), origin + Duration::from_millis(100));

        let done = origin + Duration::from_millis(137);
        assert_eq!(schedule.next_deadline(done), done + Duration::from_millis(1));
    }

    #[test]
    fn rebase_restarts_the_grid() {
        let origin = Instant::now();
        let mut schedule = PacingPolicy::new(&PacingConfig::limited(10.0))
            .unwrap()
            .schedule(origin);
        schedule.next_deadline(origin);
        schedule.next_deadline(origin);

        let now = origin + Duration::from_secs(3);
        schedule.rebase(now);
        assert_eq!(schedule.next_deadline(now), now + Duration::from_millis(100));
    }
}
