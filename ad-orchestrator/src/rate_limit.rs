use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A single "last external call" timestamp shared by every external source.
pub struct RateLimiter {
    last_call: Mutex<Option<DateTime<Utc>>>,
    min_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(min_interval_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            last_call: Mutex::new(None),
            min_interval: Duration::seconds(min_interval_secs as i64),
            clock,
        }
    }

    /// Claims the next external call slot. The timestamp is recorded whether
    /// or not the call that follows succeeds.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut last_call = self.last_call.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(last) = *last_call {
            let elapsed = now.signed_duration_since(last);
            if elapsed < self.min_interval {
                debug!(
                    "Rate limited: {}s since last external call, need {}s",
                    elapsed.num_seconds(),
                    self.min_interval.num_seconds()
                );
                return false;
            }
        }

        *last_call = Some(now);
        true
    }

    pub fn last_call(&self) -> Option<DateTime<Utc>> {
        *self.last_call.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Time left before the next call is eligible; zero when eligible now.
    pub fn wait_remaining(&self) -> Duration {
        match self.last_call() {
            Some(last) => {
                let elapsed = self.clock.now().signed_duration_since(last);
                (self.min_interval - elapsed).max(Duration::zero())
            }
            None => Duration::zero(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn second_call_inside_interval_is_refused() {
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = RateLimiter::new(60, clock.clone());

        assert!(limiter.try_acquire());
        clock.advance_secs(59);
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.wait_remaining(), Duration::seconds(1));

        clock.advance_secs(1);
        assert!(limiter.try_acquire());
    }

    #[test]
    fn refused_attempts_do_not_move_the_timestamp() {
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = RateLimiter::new(60, clock.clone());

        assert!(limiter.try_acquire());
        let first = limiter.last_call();
        clock.advance_secs(30);
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.last_call(), first);
    }
}
