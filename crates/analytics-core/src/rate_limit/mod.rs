//! Fixed-window rate limiting across four route classes (general, ingestion,
//! analytics, admin), each with its own window and request ceiling, backed
//! by the same `KvCache::incr` primitive the ingestion pipeline uses for
//! dedup counters.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::KvCache;
use crate::config::RateLimitConfig;
use crate::error::AppError;

/// Which configured tier a request falls under. Routing code picks the
/// class; this module only knows how to enforce whichever one it's given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    General,
    Ingestion,
    Analytics,
    Admin,
}

impl RouteClass {
    fn label(self) -> &'static str {
        match self {
            RouteClass::General => "general",
            RouteClass::Ingestion => "ingestion",
            RouteClass::Analytics => "analytics",
            RouteClass::Admin => "admin",
        }
    }

    fn window_and_limit(self, config: &RateLimitConfig) -> (Duration, u32) {
        match self {
            RouteClass::General => (config.general_window, config.general_max_requests),
            RouteClass::Ingestion => (config.ingestion_window, config.ingestion_max_requests),
            RouteClass::Analytics => (config.analytics_window, config.analytics_max_requests),
            RouteClass::Admin => (config.admin_window, config.admin_max_requests),
        }
    }
}

/// Outcome of a rate limit check, carrying enough to populate standard
/// `X-RateLimit-*` response headers either way.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after: Duration,
}

pub struct RateLimiter {
    cache: Arc<dyn KvCache>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn KvCache>, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    /// Checks and consumes one request against `identity`'s (tenant or API
    /// key) fixed window for `class`. The window's cache key rotates every
    /// `window` seconds, so a stale counter from a prior window self-expires
    /// rather than needing explicit reset logic.
    pub async fn check(&self, identity: &str, class: RouteClass) -> Result<RateLimitDecision, AppError> {
        let (window, limit) = class.window_and_limit(&self.config);
        let key = format!("ratelimit:{}:{}", class.label(), identity);

        // Cache unavailability degrades to "allow" — quota enforcement must
        // not take the whole request down with it.
        let count = match self.cache.incr(&key, window).await {
            Ok(count) => count,
            Err(err) => {
                warn!(class = class.label(), error = %err, "rate limit cache unavailable, allowing request");
                return Ok(RateLimitDecision { allowed: true, limit, remaining: limit, retry_after: window });
            }
        };
        let allowed = count as u64 <= limit as u64;
        let remaining = limit.saturating_sub(count.max(0) as u32);

        Ok(RateLimitDecision { allowed, limit, remaining, retry_after: window })
    }

    /// Convenience wrapper that turns a rejected decision directly into the
    /// `AppError` variant handlers should propagate.
    pub async fn enforce(&self, identity: &str, class: RouteClass) -> Result<RateLimitDecision, AppError> {
        let decision = self.check(identity, class).await?;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(AppError::rate_limited(
                format!("rate limit exceeded for {} requests", class.label()),
                decision.retry_after,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    fn limiter(max: u32) -> RateLimiter {
        let config = RateLimitConfig {
            general_window: Duration::from_secs(60),
            general_max_requests: max,
            ingestion_window: Duration::from_secs(60),
            ingestion_max_requests: max,
            analytics_window: Duration::from_secs(60),
            analytics_max_requests: max,
            admin_window: Duration::from_secs(60),
            admin_max_requests: max,
        };
        RateLimiter::new(Arc::new(InMemoryCache::new()), config)
    }

    #[tokio::test]
    async fn allows_requests_under_the_limit() {
        let limiter = limiter(3);
        for _ in 0..3 {
            let decision = limiter.check("key1", RouteClass::General).await.unwrap();
            assert!(decision.allowed);
        }
    }

    #[tokio::test]
    async fn rejects_requests_over_the_limit() {
        let limiter = limiter(2);
        limiter.check("key1", RouteClass::Ingestion).await.unwrap();
        limiter.check("key1", RouteClass::Ingestion).await.unwrap();
        let third = limiter.check("key1", RouteClass::Ingestion).await.unwrap();
        assert!(!third.allowed);
    }

    #[tokio::test]
    async fn tiers_are_tracked_independently() {
        let limiter = limiter(1);
        let general = limiter.check("key1", RouteClass::General).await.unwrap();
        let admin = limiter.check("key1", RouteClass::Admin).await.unwrap();
        assert!(general.allowed);
        assert!(admin.allowed);
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let limiter = limiter(1);
        limiter.check("key1", RouteClass::General).await.unwrap();
        let other = limiter.check("key2", RouteClass::General).await.unwrap();
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn enforce_returns_rate_limited_error_when_exhausted() {
        let limiter = limiter(1);
        limiter.enforce("key1", RouteClass::Admin).await.unwrap();
        let err = limiter.enforce("key1", RouteClass::Admin).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
