use crate::rate_limit::RateLimitConfig;
use crate::rate_limit::types::MAX_WINDOW_MS;
use crate::session::SessionConfig;
use crate::session::types::MAX_SESSION_WINDOW_SECS;
use crate::utils::{AssessError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// Rejects values that would make expiry or window arithmetic meaningless
    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(AssessError::config("bind_addr must not be empty"));
        }
        if self.session.window_secs == 0 || self.session.window_secs > MAX_SESSION_WINDOW_SECS {
            return Err(AssessError::config(format!(
                "session.window_secs must be between 1 and {}",
                MAX_SESSION_WINDOW_SECS
            )));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(AssessError::config("session.sweep_interval_secs must be positive"));
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            return Err(AssessError::config(
                "rate_limit.sweep_interval_secs must be positive",
            ));
        }
        for (route, limit) in &self.rate_limit.routes {
            if !route.starts_with('/') {
                return Err(AssessError::config(format!(
                    "rate limit route '{}' must start with '/'",
                    route
                )));
            }
            if limit.window_ms == 0 || limit.window_ms > MAX_WINDOW_MS {
                return Err(AssessError::config(format!(
                    "rate limit route '{}' needs a window_ms between 1 and {}",
                    route, MAX_WINDOW_MS
                )));
            }
            if limit.max == 0 {
                return Err(AssessError::config(format!(
                    "rate limit route '{}' needs max >= 1",
                    route
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RouteLimit;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.session.window_secs, 86_400);
        assert_eq!(config.session.sweep_interval_secs, 300);
        assert_eq!(config.rate_limit.sweep_interval_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_deserialization() {
        let json = r#"{
            "session": { "window_secs": 3600, "sweep_interval_secs": 60 }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.session.window_secs, 3600);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.rate_limit, RateLimitConfig::default());
    }

    #[test]
    fn test_config_route_table_deserialization() {
        let json = r#"{
            "rate_limit": {
                "sweep_interval_secs": 120,
                "routes": { "/api/export": { "window_ms": 1000, "max": 2 } }
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.rate_limit.routes.len(), 1);
        assert_eq!(
            config.rate_limit.routes["/api/export"],
            RouteLimit::new(1000, 2)
        );
        assert!(config.rate_limit.trust_forwarded_for);

        let json = r#"{ "rate_limit": { "trust_forwarded_for": false } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(!config.rate_limit.trust_forwarded_for);
        assert_eq!(config.rate_limit.routes.len(), 3);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.session.window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.sweep_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config
            .rate_limit
            .routes
            .insert("/api/x".to_string(), RouteLimit::new(1000, 0));
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config
            .rate_limit
            .routes
            .insert("/api/x".to_string(), RouteLimit::new(0, 5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_route() {
        let mut config = Config::default();
        config
            .rate_limit
            .routes
            .insert("api/x".to_string(), RouteLimit::new(1000, 5));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api/x"));
    }
}
