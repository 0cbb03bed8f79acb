// Fixed-window rate limiter keyed by (client, route)

use super::types::{Quota, RateLimitConfig, RateLimitDecision, RouteLimit, WindowCounter};
use crate::sweeper::spawn_sweeper;
use crate::utils::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

type CounterKey = (String, String);

/// In-memory fixed-window limiter.
///
/// Clones share the same counters.
#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<RwLock<HashMap<CounterKey, WindowCounter>>>,
    config: Arc<RateLimitConfig>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Maps a request path onto the configured route table.
    ///
    /// An exact entry wins; otherwise the longest configured prefix that ends on
    /// a `/` boundary of `path` is used.
    pub fn resolve_route(&self, path: &str) -> Option<&str> {
        if let Some((route, _)) = self.config.routes.get_key_value(path) {
            return Some(route.as_str());
        }

        self.config
            .routes
            .keys()
            .filter(|route| {
                let route = route.trim_end_matches('/');
                path.strip_prefix(route)
                    .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|route| route.len())
            .map(String::as_str)
    }

    /// Counts one request from `client_key` against `route`
    pub async fn check(&self, client_key: &str, route: &str) -> RateLimitDecision {
        let Some(limit) = self.config.routes.get(route).copied() else {
            return RateLimitDecision::unrestricted();
        };

        let now = self.clock.now();
        let mut counters = self.counters.write().await;
        let key = (client_key.to_string(), route.to_string());

        match counters.get_mut(&key) {
            Some(counter) if !counter.is_elapsed(now) => {
                if counter.count < limit.max {
                    counter.count += 1;
                    Self::decision(true, limit, counter)
                } else {
                    warn!(
                        client = %client_key,
                        route = %route,
                        limit = limit.max,
                        "Rate limit exceeded"
                    );
                    Self::decision(false, limit, counter)
                }
            }
            _ => {
                let counter = WindowCounter::start(now, limit.window());
                counters.insert(key, counter);
                debug!(client = %client_key, route = %route, "Started rate-limit window");
                Self::decision(true, limit, &counter)
            }
        }
    }

    /// Drops counters whose window has elapsed
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut counters = self.counters.write().await;
        let before = counters.len();
        counters.retain(|_, counter| !counter.is_elapsed(now));
        let removed = before - counters.len();
        drop(counters);

        if removed > 0 {
            info!(counters_removed = removed, "Swept elapsed rate-limit windows");
        }
        removed
    }

    /// Number of tracked (client, route) counters
    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.counters.read().await.is_empty()
    }

    /// Starts the periodic counter sweeper.
    ///
    /// Returns a JoinHandle for graceful shutdown coordination and a shutdown sender.
    pub fn start_sweep_task(
        &self,
    ) -> (tokio::task::JoinHandle<()>, tokio::sync::mpsc::Sender<()>) {
        let limiter = self.clone();
        spawn_sweeper("rate_limit", self.config.sweep_interval(), move || {
            let limiter = limiter.clone();
            async move { limiter.sweep_expired().await }
        })
    }

    fn decision(allowed: bool, limit: RouteLimit, counter: &WindowCounter) -> RateLimitDecision {
        RateLimitDecision {
            allowed,
            quota: Some(Quota {
                limit: limit.max,
                remaining: limit.max.saturating_sub(counter.count),
                reset_at: counter.reset_at,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn limiter(routes: &[(&str, u64, u32)]) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::starting_now();
        let routes: BTreeMap<String, RouteLimit> = routes
            .iter()
            .map(|(route, window_ms, max)| (route.to_string(), RouteLimit::new(*window_ms, *max)))
            .collect();
        let config = RateLimitConfig {
            sweep_interval_secs: 300,
            trust_forwarded_for: true,
            routes,
        };
        (RateLimiter::new(config, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_window_counts_down_then_denies() {
        let (limiter, clock) = limiter(&[("/api/a", 1_000, 3)]);

        let remaining: Vec<_> = [
            limiter.check("1.2.3.4", "/api/a").await,
            limiter.check("1.2.3.4", "/api/a").await,
            limiter.check("1.2.3.4", "/api/a").await,
        ]
        .iter()
        .map(|d| {
            assert!(d.allowed);
            d.remaining().unwrap()
        })
        .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        clock.advance(Duration::milliseconds(500));
        let denied = limiter.check("1.2.3.4", "/api/a").await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining(), Some(0));
        assert_eq!(denied.retry_after(clock.now()), Some(1));
    }

    #[tokio::test]
    async fn test_denied_requests_do_not_extend_count() {
        let (limiter, _) = limiter(&[("/api/a", 1_000, 1)]);
        limiter.check("c", "/api/a").await;
        for _ in 0..5 {
            assert!(!limiter.check("c", "/api/a").await.allowed);
        }
        let counters = limiter.counters.read().await;
        assert_eq!(counters[&("c".to_string(), "/api/a".to_string())].count, 1);
    }

    #[tokio::test]
    async fn test_fresh_window_after_elapse() {
        let (limiter, clock) = limiter(&[("/api/a", 1_000, 3)]);
        for _ in 0..4 {
            limiter.check("c", "/api/a").await;
        }

        clock.advance(Duration::milliseconds(1_000));
        let decision = limiter.check("c", "/api/a").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining(), Some(2));
        assert_eq!(
            decision.quota.unwrap().reset_at,
            clock.now() + Duration::milliseconds(1_000)
        );
    }

    #[tokio::test]
    async fn test_unconfigured_route_is_unrestricted() {
        let (limiter, _) = limiter(&[("/api/a", 1_000, 1)]);
        for _ in 0..100 {
            let decision = limiter.check("c", "/static/app.js").await;
            assert!(decision.allowed);
            assert!(decision.quota.is_none());
        }
        assert!(limiter.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_drops_elapsed_counters() {
        let (limiter, clock) = limiter(&[("/api/a", 1_000, 5), ("/api/b", 10_000, 5)]);
        limiter.check("c", "/api/a").await;
        limiter.check("c", "/api/b").await;

        assert_eq!(limiter.sweep_expired().await, 0);
        clock.advance(Duration::seconds(2));
        assert_eq!(limiter.sweep_expired().await, 1);
        assert_eq!(limiter.len().await, 1);
    }

    #[test]
    fn test_resolve_route() {
        let (limiter, _) = limiter(&[
            ("/api/sessions", 1_000, 1),
            ("/api", 1_000, 1),
            ("/api/reports/", 1_000, 1),
        ]);

        assert_eq!(limiter.resolve_route("/api/sessions"), Some("/api/sessions"));
        assert_eq!(limiter.resolve_route("/api/sessions/abc"), Some("/api/sessions"));
        assert_eq!(limiter.resolve_route("/api/sessionsX"), Some("/api"));
        assert_eq!(limiter.resolve_route("/api/reports/pdf"), Some("/api/reports/"));
        assert_eq!(limiter.resolve_route("/health"), None);
        assert_eq!(limiter.resolve_route("/apix"), None);
    }
}
