//! Per-identity rate limiting backed by a shared Redis counter
//!
//! Fixed window: each request atomically increments `ratelimit:{user_id}`;
//! the first increment in a window sets the key's expiry to the window
//! length, and a post-increment value above the limit denies the request
//! with a retry hint. Concurrent requests from the same identity are
//! serialized by Redis's INCR, not by local locking.
//!
//! The window is only approximately aligned with request arrival: a caller
//! can burst up to twice the limit across a window boundary. That is the
//! accepted cost of the fixed-window design.

use redis::AsyncCommands;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RedisSettings;

/// Counter store errors
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Outcome of a quota check for one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied { retry_after_secs: u64 },
    /// Counter store errored and fail-open is disabled.
    Unavailable,
}

/// Fixed-window quota counter over Redis
///
/// Constructed without a client when the counter store is unconfigured, in
/// which case every check allows the request.
#[derive(Clone)]
pub struct QuotaCounter {
    client: Option<redis::Client>,
    limit: i64,
    window_secs: u64,
    fail_open: bool,
}

impl QuotaCounter {
    pub fn new(settings: &RedisSettings) -> Self {
        let client = if settings.url.is_empty() {
            info!("No counter store URL configured, rate limiting disabled");
            None
        } else {
            match redis::Client::open(settings.url.as_str()) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "Invalid counter store URL, rate limiting disabled");
                    None
                }
            }
        };

        QuotaCounter {
            client,
            limit: settings.limit,
            window_secs: settings.window_secs,
            fail_open: settings.fail_open,
        }
    }

    /// Counter with no backing store; allows everything.
    pub fn disabled(limit: i64, window_secs: u64) -> Self {
        QuotaCounter {
            client: None,
            limit,
            window_secs,
            fail_open: true,
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Answer allow/deny for the current request and update shared state.
    pub async fn check(&self, user_id: &str) -> QuotaDecision {
        let Some(client) = self.client.as_ref() else {
            return QuotaDecision::Allowed;
        };

        match self.increment(client, user_id).await {
            Ok(count) => self.decide(count),
            Err(e) if self.fail_open => {
                warn!(error = %e, user_id = %user_id, "Counter store unreachable, failing open");
                QuotaDecision::Allowed
            }
            Err(e) => {
                warn!(error = %e, user_id = %user_id, "Counter store unreachable, failing closed");
                QuotaDecision::Unavailable
            }
        }
    }

    async fn increment(&self, client: &redis::Client, user_id: &str) -> Result<i64, QuotaError> {
        let mut conn = client.get_multiplexed_async_connection().await?;

        let key = format!("ratelimit:{}", user_id);
        let count: i64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&key, self.window_secs as i64).await?;
        }

        Ok(count)
    }

    fn decide(&self, count: i64) -> QuotaDecision {
        if count > self.limit {
            QuotaDecision::Denied {
                retry_after_secs: self.window_secs,
            }
        } else {
            QuotaDecision::Allowed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> QuotaCounter {
        QuotaCounter::disabled(10, 60)
    }

    #[test]
    fn test_counts_within_limit_allowed() {
        let counter = counter();
        for count in 1..=10 {
            assert_eq!(counter.decide(count), QuotaDecision::Allowed);
        }
    }

    #[test]
    fn test_count_above_limit_denied_with_window_hint() {
        let counter = counter();
        assert_eq!(
            counter.decide(11),
            QuotaDecision::Denied {
                retry_after_secs: 60
            }
        );
        assert_eq!(
            counter.decide(500),
            QuotaDecision::Denied {
                retry_after_secs: 60
            }
        );
    }

    #[tokio::test]
    async fn test_unconfigured_store_allows_everything() {
        let counter = counter();
        for _ in 0..100 {
            assert_eq!(counter.check("user_1").await, QuotaDecision::Allowed);
        }
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_open() {
        // Valid URL, nothing listening on the port
        let counter = QuotaCounter::new(&RedisSettings {
            url: "redis://127.0.0.1:1/".to_string(),
            fail_open: true,
            limit: 10,
            window_secs: 60,
        });
        assert_eq!(counter.check("user_1").await, QuotaDecision::Allowed);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_closed_when_toggled() {
        let counter = QuotaCounter::new(&RedisSettings {
            url: "redis://127.0.0.1:1/".to_string(),
            fail_open: false,
            limit: 10,
            window_secs: 60,
        });
        assert_eq!(counter.check("user_1").await, QuotaDecision::Unavailable);
    }
}
