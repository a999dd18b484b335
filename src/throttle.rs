/// Minimum spacing between published UI snapshots.
pub const DEFAULT_INTERVAL_MS: f64 = 100.0;

/// Accepts an offer only when enough wall-clock time has passed since the
/// last accepted one. Each marker owns its own limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiter {
    interval_ms: f64,
    last_accepted_ms: Option<f64>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_MS)
    }
}

impl RateLimiter {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            last_accepted_ms: None,
        }
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn last_accepted_ms(&self) -> Option<f64> {
        self.last_accepted_ms
    }

    /// The first offer is always accepted.
    pub fn try_accept(&mut self, now_ms: f64) -> bool {
        let open = match self.last_accepted_ms {
            None => true,
            Some(last) => now_ms - last >= self.interval_ms,
        };
        if open {
            self.last_accepted_ms = Some(now_ms);
        }
        open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_offer_accepted() {
        let mut limiter = RateLimiter::default();
        assert!(limiter.try_accept(0.0));
        assert!(!limiter.try_accept(0.5));
    }

    #[test]
    fn test_reference_resets_on_accept() {
        let mut limiter = RateLimiter::default();
        assert!(limiter.try_accept(1000.0));
        assert!(!limiter.try_accept(1099.9));
        assert!(limiter.try_accept(1100.0));
        assert!(!limiter.try_accept(1150.0));
        assert!(limiter.try_accept(1200.0));
        assert_eq!(limiter.last_accepted_ms(), Some(1200.0));
    }

    #[test]
    fn test_rejection_keeps_reference() {
        let mut limiter = RateLimiter::new(50.0);
        limiter.try_accept(0.0);
        for now in [10.0, 20.0, 30.0, 40.0] {
            assert!(!limiter.try_accept(now));
        }
        assert_eq!(limiter.last_accepted_ms(), Some(0.0));
        assert!(limiter.try_accept(50.0));
    }
}
