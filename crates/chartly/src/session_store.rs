// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::data_profiler::DatasetProfile;
use crate::error::{ChartlyError, ConfigError, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_sessions: usize,
}
impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            sweep_interval_secs: 60,
            max_sessions: 1000,
        }
    }
}
impl SessionConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sessions.ttl_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sessions.sweep_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "sessions.max_sessions must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
/// A profiled upload. The session is the only owner of its profile.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub file_name: Option<String>,
    pub profile: DatasetProfile,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    ttl: Duration,
    max_sessions: usize,
}
impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        let ttl_secs = config.ttl_secs.min(MAX_TTL_SECS) as i64;
        Self {
            sessions: DashMap::new(),
            ttl: Duration::seconds(ttl_secs),
            max_sessions: config.max_sessions.max(1),
        }
    }
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
    pub fn insert(&self, profile: DatasetProfile, file_name: Option<String>) -> Arc<Session> {
        self.insert_at(profile, file_name, Utc::now())
    }
    pub(crate) fn insert_at(
        &self,
        profile: DatasetProfile,
        file_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Arc<Session> {
        if self.sessions.len() >= self.max_sessions {
            self.sweep_expired_at(now);
        }
        while self.sessions.len() >= self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .min_by(|a, b| {
                    a.value()
                        .expires_at
                        .cmp(&b.value().expires_at)
                        .then_with(|| a.key().cmp(b.key()))
                })
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else { break };
            self.sessions.remove(&oldest);
            info!(session_id = %oldest, "Session capacity reached, evicted oldest session");
        }
        let session = Arc::new(Session {
            id: Uuid::new_v4().to_string(),
            file_name,
            profile,
            created_at: now,
            expires_at: now + self.ttl,
        });
        self.sessions
            .insert(session.id.clone(), Arc::clone(&session));
        info!(
            session_id = %session.id,
            rows = session.profile.row_count,
            columns = session.profile.columns.len(),
            expires_at = %session.expires_at,
            "Session created"
        );
        session
    }
    /// Returns the live session, removing it first if it has expired.
    pub fn get(&self, session_id: &str) -> Result<Arc<Session>> {
        self.get_at(session_id, Utc::now())
    }
    pub(crate) fn get_at(&self, session_id: &str, now: DateTime<Utc>) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()));
        match session {
            Some(session) if !session.is_expired_at(now) => Ok(session),
            Some(_) => {
                self.sessions
                    .remove_if(session_id, |_, s| s.is_expired_at(now));
                debug!(session_id, "Session expired on access");
                Err(ChartlyError::session_not_found(session_id))
            }
            None => Err(ChartlyError::session_not_found(session_id)),
        }
    }
    pub fn evict(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!(session_id, "Session evicted");
        }
        removed
    }
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }
    pub(crate) fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!(removed, remaining = self.sessions.len(), "Expired sessions swept");
        }
        removed
    }
}
impl Default for SessionStore {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_profiler::DataProfiler;

    fn profile() -> DatasetProfile {
        DataProfiler::new()
            .profile_csv_bytes(b"a,b\n1,x\n2,y\n")
            .unwrap()
    }

    fn store(ttl_secs: u64, max_sessions: usize) -> SessionStore {
        SessionStore::new(&SessionConfig {
            ttl_secs,
            sweep_interval_secs: 60,
            max_sessions,
        })
    }

    #[test]
    fn test_insert_and_get() {
        let store = store(60, 10);
        let session = store.insert(profile(), Some("data.csv".into()));
        let fetched = store.get(&session.id).unwrap();
        assert!(Arc::ptr_eq(&session, &fetched));
        assert_eq!(fetched.profile.row_count, 2);
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn test_unknown_session_not_found() {
        let store = store(60, 10);
        assert!(matches!(
            store.get("nope"),
            Err(ChartlyError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_expired_session_removed_on_access() {
        let store = store(60, 10);
        let now = Utc::now();
        let session = store.insert_at(profile(), None, now);
        assert!(store.get_at(&session.id, now + Duration::seconds(59)).is_ok());
        assert!(matches!(
            store.get_at(&session.id, now + Duration::seconds(60)),
            Err(ChartlyError::SessionNotFound { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reader_keeps_profile_after_eviction() {
        let store = store(60, 10);
        let session = store.insert(profile(), None);
        let held = store.get(&session.id).unwrap();
        assert!(store.evict(&session.id));
        assert!(!store.evict(&session.id));
        assert_eq!(held.profile.columns.len(), 2);
        assert!(store.get(&session.id).is_err());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = store(60, 10);
        let now = Utc::now();
        store.insert_at(profile(), None, now - Duration::seconds(120));
        let live = store.insert_at(profile(), None, now);
        assert_eq!(store.sweep_expired_at(now), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get_at(&live.id, now).is_ok());
    }

    #[test]
    fn test_capacity_evicts_oldest_expiring() {
        let store = store(60, 2);
        let now = Utc::now();
        let first = store.insert_at(profile(), None, now);
        let second = store.insert_at(profile(), None, now + Duration::seconds(1));
        let third = store.insert_at(profile(), None, now + Duration::seconds(2));
        assert_eq!(store.len(), 2);
        assert!(store.get_at(&first.id, now).is_err());
        assert!(store.get_at(&second.id, now).is_ok());
        assert!(store.get_at(&third.id, now).is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = SessionConfig {
            ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ttl_is_clamped() {
        assert_eq!(store(90, 10).ttl(), Duration::seconds(90));
        assert_eq!(store(u64::MAX, 10).ttl(), Duration::days(365));
    }
}
