use crate::session::types::{SessionConfig, SessionData, SessionError, SessionRecord};
use crate::sweeper::spawn_sweeper;
use crate::utils::{AssessError, Clock, Result};
use chrono::DateTime;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// In-process registry of sliding-expiration sessions.
///
/// Cloning is cheap and every clone shares the same records, which is how the
/// HTTP layer and the background sweeper see one registry.
#[derive(Clone)]
pub struct SessionRegistry {
    records: Arc<RwLock<HashMap<String, SessionRecord>>>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers a new session and returns its id.
    ///
    /// The id is a random UUID v4; a collision with a stored id is retried.
    pub async fn create(
        &self,
        session_type: &str,
        initial_data: Option<SessionData>,
    ) -> Result<String> {
        let session_type = session_type.trim();
        if session_type.is_empty() {
            return Err(AssessError::invalid_input("session type must not be empty"));
        }

        let mut guard = self.records.write().await;
        let mut id = Uuid::new_v4().to_string();
        while guard.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        let record = SessionRecord::new(
            id.clone(),
            session_type.to_string(),
            initial_data.unwrap_or_default(),
            self.clock.now(),
            self.config.window(),
        );
        guard.insert(id.clone(), record);
        drop(guard);

        info!(session_id = %id, session_type = %session_type, "Created session");
        Ok(id)
    }

    /// Checks that `id` names a live session and slides its window forward.
    ///
    /// An expired record is removed on the spot.
    pub async fn validate(&self, id: &str) -> bool {
        let mut guard = self.records.write().await;
        Self::touch_live(&mut guard, id, self.clock.now(), &self.config).is_ok()
    }

    /// Validating read of the whole record
    pub async fn get(&self, id: &str) -> Option<SessionRecord> {
        let mut guard = self.records.write().await;
        Self::touch_live(&mut guard, id, self.clock.now(), &self.config)
            .ok()
            .map(|record| record.clone())
    }

    /// Returns a copy of the session's data, or `None` when there is no live session
    pub async fn get_data(&self, id: &str) -> Option<SessionData> {
        let mut guard = self.records.write().await;
        Self::touch_live(&mut guard, id, self.clock.now(), &self.config)
            .ok()
            .map(|record| record.data.clone())
    }

    /// Shallow-merges `partial` into the session's data.
    ///
    /// Returns the merged data as seen under the same lock, or `None` when
    /// there is no live session.
    pub async fn update_data(&self, id: &str, partial: SessionData) -> Option<SessionData> {
        let mut guard = self.records.write().await;
        let record = Self::touch_live(&mut guard, id, self.clock.now(), &self.config).ok()?;
        let keys = partial.len();
        record.merge(partial);
        debug!(session_id = %id, keys = keys, "Merged session data");
        Some(record.data.clone())
    }

    /// Removes the session if present. Idempotent.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.records.write().await.remove(id).is_some();
        if removed {
            info!(session_id = %id, "Deleted session");
        }
        removed
    }

    /// Removes every expired record and returns how many were dropped
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.retain(|_, record| !record.is_expired(now));
        let removed = before - guard.len();
        let remaining = guard.len();
        drop(guard);

        if removed > 0 {
            info!(
                sessions_removed = removed,
                sessions_remaining = remaining,
                "Swept expired sessions"
            );
        } else {
            debug!(sessions_remaining = remaining, "Session sweep found nothing to remove");
        }
        removed
    }

    /// Number of stored records, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Starts the periodic sweeper.
    ///
    /// Returns a JoinHandle for graceful shutdown coordination and a shutdown sender
    /// to signal the task to stop.
    pub fn start_sweep_task(
        &self,
    ) -> (tokio::task::JoinHandle<()>, tokio::sync::mpsc::Sender<()>) {
        let registry = self.clone();
        spawn_sweeper("sessions", self.config.sweep_interval(), move || {
            let registry = registry.clone();
            async move { registry.sweep_expired().await }
        })
    }

    /// Looks up a live record and refreshes it, evicting it if it has lapsed.
    ///
    /// Runs under the caller's write guard so check and mutation are atomic.
    fn touch_live<'a>(
        records: &'a mut HashMap<String, SessionRecord>,
        id: &str,
        now: DateTime<Utc>,
        config: &SessionConfig,
    ) -> std::result::Result<&'a mut SessionRecord, SessionError> {
        let expired = match records.get(id) {
            None => {
                debug!(session_id = %id, reason = %SessionError::NotFound, "Session lookup failed");
                return Err(SessionError::NotFound);
            }
            Some(record) => record.is_expired(now),
        };

        if expired {
            records.remove(id);
            debug!(session_id = %id, reason = %SessionError::Expired, "Session lookup failed");
            return Err(SessionError::Expired);
        }

        let record = records.get_mut(id).ok_or(SessionError::NotFound)?;
        record.touch(now, config.window());
        Ok(record)
    }
}
