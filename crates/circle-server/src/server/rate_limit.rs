//! Rate limiting for the auth endpoints.
//!
//! One `governor` limiter is shared by every client: it allows a burst of
//! `capacity` requests and regains one cell per `refill` interval. A request
//! that does not conform is rejected with 429.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::warn;

use super::routes::ErrorResponse;

/// Limiter shared by all auth requests.
pub type AuthRateLimiter = DefaultDirectRateLimiter;

/// Quota allowing `capacity` requests at once, regaining one every `refill`.
///
/// Zero values are rejected by config loading; here they fall back to a burst
/// of one and one cell per second.
pub fn quota(capacity: u32, refill: Duration) -> Quota {
    let burst = NonZeroU32::new(capacity).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(refill)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

/// Build the shared auth limiter.
pub fn auth_limiter(capacity: u32, refill: Duration) -> AuthRateLimiter {
    RateLimiter::direct(quota(capacity, refill))
}

/// Middleware rejecting requests once the limiter is exhausted.
pub async fn limit_requests(
    State(limiter): State<Arc<AuthRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.check().is_ok() {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Rate limit exceeded");
    ErrorResponse::new("rate_limited", "Rate limit exceeded")
        .with_status(StatusCode::TOO_MANY_REQUESTS)
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    fn limiter_with_clock(
        capacity: u32,
        refill: Duration,
    ) -> (
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            FakeRelativeClock,
            governor::middleware::NoOpMiddleware<governor::nanos::Nanos>,
        >,
        FakeRelativeClock,
    ) {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::direct_with_clock(quota(capacity, refill), &clock);
        (limiter, clock)
    }

    #[test]
    fn test_burst_then_reject() {
        let (limiter, _clock) = limiter_with_clock(3, Duration::from_millis(50));

        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_refill_one_cell_per_interval() {
        let (limiter, clock) = limiter_with_clock(2, Duration::from_millis(50));
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());

        clock.advance(Duration::from_millis(50));
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());

        clock.advance(Duration::from_millis(120));
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let (limiter, clock) = limiter_with_clock(2, Duration::from_millis(50));

        clock.advance(Duration::from_secs(10));
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_zero_values_fall_back() {
        let quota = quota(0, Duration::ZERO);
        assert_eq!(quota.burst_size(), NonZeroU32::MIN);
        assert_eq!(quota.replenish_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_auth_limiter_uses_configured_burst() {
        let limiter = auth_limiter(2, Duration::from_secs(3600));
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
