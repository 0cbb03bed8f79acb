use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Default sliding window: 24 hours
pub const DEFAULT_SESSION_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Upper bound accepted for the sliding window: 365 days
pub const MAX_SESSION_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Default sweep interval: 5 minutes
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Session-scoped attributes
pub type SessionData = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub session_type: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub data: SessionData,
}

impl SessionRecord {
    pub fn new(
        id: String,
        session_type: String,
        data: SessionData,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        Self {
            id,
            session_type,
            created_at: now,
            last_accessed_at: now,
            expires_at: now + window,
            data,
        }
    }

    /// A record stays live up to and including `expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Slides the expiration window forward from `now`
    pub fn touch(&mut self, now: DateTime<Utc>, window: Duration) {
        self.last_accessed_at = now;
        self.expires_at = now + window;
    }

    /// Shallow merge: top-level keys in `partial` replace existing values
    pub fn merge(&mut self, partial: SessionData) {
        for (key, value) in partial {
            self.data.insert(key, value);
        }
    }
}

/// Registry timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sliding expiration window in seconds
    pub window_secs: u64,
    /// How often the background sweeper runs, in seconds
    pub sweep_interval_secs: u64,
}

impl SessionConfig {
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs.min(MAX_SESSION_WINDOW_SECS) as i64)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_SESSION_WINDOW_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

/// Why a lookup failed. Only logged; callers just see "no session".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session expired")]
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(now: DateTime<Utc>) -> SessionRecord {
        SessionRecord::new(
            "abc".to_string(),
            "assessment".to_string(),
            SessionData::new(),
            now,
            Duration::hours(24),
        )
    }

    #[test]
    fn test_record_creation() {
        let now = Utc::now();
        let record = record(now);
        assert_eq!(record.created_at, now);
        assert_eq!(record.last_accessed_at, now);
        assert_eq!(record.expires_at, now + Duration::hours(24));
        assert!(record.data.is_empty());
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let record = record(now);
        assert!(!record.is_expired(record.expires_at));
        assert!(record.is_expired(record.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_touch_slides_window() {
        let now = Utc::now();
        let mut record = record(now);
        let later = now + Duration::hours(5);

        record.touch(later, Duration::hours(24));

        assert_eq!(record.last_accessed_at, later);
        assert_eq!(record.expires_at, later + Duration::hours(24));
        assert!(record.expires_at >= record.last_accessed_at);
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut record = record(Utc::now());
        record.data.insert("answers".to_string(), json!({"q1": 3, "q2": 4}));
        record.data.insert("step".to_string(), json!(1));

        let mut partial = SessionData::new();
        partial.insert("answers".to_string(), json!({"q3": 2}));
        record.merge(partial);

        // Nested objects are replaced, not deep-merged
        assert_eq!(record.data["answers"], json!({"q3": 2}));
        assert_eq!(record.data["step"], json!(1));
    }

    #[test]
    fn test_serialization_uses_type_key() {
        let record = record(Utc::now());
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"assessment\""));
        assert!(json.contains("expires_at"));
        assert!(json.contains("last_accessed_at"));
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.window(), Duration::hours(24));
        assert_eq!(config.sweep_interval(), std::time::Duration::from_secs(300));
    }
}
