use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default counter sweep interval: 5 minutes
pub const DEFAULT_RATE_LIMIT_SWEEP_SECS: u64 = 5 * 60;

/// Longest accepted window: 365 days
pub const MAX_WINDOW_MS: u64 = 365 * 24 * 60 * 60 * 1000;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Fixed-window limit for one route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLimit {
    pub window_ms: u64,
    pub max: u32,
}

impl RouteLimit {
    pub fn new(window_ms: u64, max: u32) -> Self {
        Self { window_ms, max }
    }

    pub fn window(&self) -> Duration {
        Duration::milliseconds(self.window_ms.min(MAX_WINDOW_MS) as i64)
    }
}

/// Limiter configuration: the route table plus sweep cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub sweep_interval_secs: u64,
    /// Key clients by `X-Forwarded-For`/`X-Real-IP`. Only safe behind a proxy
    /// that overwrites these headers; otherwise clients can pick their own key.
    pub trust_forwarded_for: bool,
    pub routes: BTreeMap<String, RouteLimit>,
}

impl RateLimitConfig {
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut routes = BTreeMap::new();
        routes.insert("/api/sessions".to_string(), RouteLimit::new(60_000, 60));
        routes.insert("/api/assessments".to_string(), RouteLimit::new(15 * 60_000, 100));
        routes.insert("/api/reports".to_string(), RouteLimit::new(60_000, 10));
        Self {
            sweep_interval_secs: DEFAULT_RATE_LIMIT_SWEEP_SECS,
            trust_forwarded_for: true,
            routes,
        }
    }
}

/// Counter for one (client, route) pair
#[derive(Debug, Clone, Copy)]
pub(crate) struct WindowCounter {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

impl WindowCounter {
    pub fn start(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
        }
    }

    /// The window is over once `reset_at` is reached
    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }
}

/// Quota details reported for configured routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Outcome of a rate-limit check. Being over the limit is a normal answer,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// `None` for routes without a configured limit
    pub quota: Option<Quota>,
}

impl RateLimitDecision {
    pub fn unrestricted() -> Self {
        Self {
            allowed: true,
            quota: None,
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        self.quota.map(|q| q.remaining)
    }

    /// Whole seconds until the window resets, rounded up and never below one.
    /// Only meaningful for denied decisions.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.allowed {
            return None;
        }
        let quota = self.quota?;
        let millis = (quota.reset_at - now).num_milliseconds().max(0) as u64;
        Some(millis.div_ceil(1000).max(1))
    }

    /// Standard rate-limit response headers for this decision
    pub fn headers(&self, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let Some(quota) = self.quota else {
            return Vec::new();
        };

        let mut headers = vec![
            (HEADER_LIMIT, quota.limit.to_string()),
            (HEADER_REMAINING, quota.remaining.to_string()),
            (HEADER_RESET, quota.reset_at.timestamp().to_string()),
        ];
        if let Some(secs) = self.retry_after(now) {
            headers.push((HEADER_RETRY_AFTER, secs.to_string()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied(now: DateTime<Utc>, reset_in_ms: i64) -> RateLimitDecision {
        RateLimitDecision {
            allowed: false,
            quota: Some(Quota {
                limit: 3,
                remaining: 0,
                reset_at: now + Duration::milliseconds(reset_in_ms),
            }),
        }
    }

    #[test]
    fn test_default_route_table() {
        let config = RateLimitConfig::default();
        assert_eq!(config.sweep_interval_secs, 300);
        assert_eq!(
            config.routes.get("/api/sessions"),
            Some(&RouteLimit::new(60_000, 60))
        );
        assert_eq!(config.routes.len(), 3);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc::now();
        assert_eq!(denied(now, 1_200).retry_after(now), Some(2));
        assert_eq!(denied(now, 1_000).retry_after(now), Some(1));
        assert_eq!(denied(now, 0).retry_after(now), Some(1));
    }

    #[test]
    fn test_retry_after_absent_when_allowed() {
        let now = Utc::now();
        let mut decision = denied(now, 5_000);
        decision.allowed = true;
        assert_eq!(decision.retry_after(now), None);
        assert_eq!(RateLimitDecision::unrestricted().retry_after(now), None);
    }

    #[test]
    fn test_headers_for_denied_decision() {
        let now = Utc::now();
        let decision = denied(now, 30_000);
        let headers = decision.headers(now);

        let reset = decision.quota.unwrap().reset_at.timestamp().to_string();
        assert!(headers.contains(&(HEADER_LIMIT, "3".to_string())));
        assert!(headers.contains(&(HEADER_REMAINING, "0".to_string())));
        assert!(headers.contains(&(HEADER_RESET, reset)));
        assert!(headers.contains(&(HEADER_RETRY_AFTER, "30".to_string())));
    }

    #[test]
    fn test_no_headers_for_unrestricted() {
        assert!(RateLimitDecision::unrestricted().headers(Utc::now()).is_empty());
    }

    #[test]
    fn test_window_counter_elapsed_at_reset() {
        let now = Utc::now();
        let counter = WindowCounter::start(now, Duration::seconds(1));
        assert!(!counter.is_elapsed(now + Duration::milliseconds(999)));
        assert!(counter.is_elapsed(now + Duration::seconds(1)));
    }
}
