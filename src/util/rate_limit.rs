//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max intents per second accepted from one connection
pub const INTENT_RATE_LIMIT: u32 = 30;

/// Per-connection intent limiter
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    intent_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self::with_limit(INTENT_RATE_LIMIT)
    }

    pub fn with_limit(intents_per_second: u32) -> Self {
        Self {
            intent_limiter: create_limiter(intents_per_second),
        }
    }

    /// Check if an intent is allowed (returns true if allowed)
    pub fn check_intent(&self) -> bool {
        self.intent_limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_beyond_limit_is_rejected() {
        let limiter = ConnectionRateLimiter::with_limit(3);

        let allowed = (0..10).filter(|_| limiter.check_intent()).count();

        assert_eq!(allowed, 3);
    }
}
