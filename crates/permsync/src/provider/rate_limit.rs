use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Default request rates per code host (requests per second).
pub mod rate_limits {
    /// GitLab.com allows 2000 requests/minute per user. Every sync worker
    /// shares the same admin token, so stay far below that.
    pub const GITLAB_DEFAULT_RPS: u32 = 5;
}

/// Paces requests to one code host instance.
///
/// Clones share the same budget, so one limiter handed to every client of an
/// instance bounds the total request rate regardless of worker count.
/// Requests are spaced evenly; there is no burst allowance.
#[derive(Clone)]
pub struct ApiRateLimiter {
    limiter: Arc<DefaultDirectRateLimiter>,
    rate: NonZeroU32,
}

impl ApiRateLimiter {
    /// A rate of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            rate,
        }
    }

    pub fn requests_per_second(&self) -> u32 {
        self.rate.get()
    }

    /// Suspend until the next request may be sent.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

impl fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiRateLimiter({}/s)", self.rate)
    }
}
