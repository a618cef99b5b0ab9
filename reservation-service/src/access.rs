//! Access gate and session contexts.
//!
//! A member unlocks the service with an access code. A successful check moves the
//! gate `Locked -> Validating -> Granted` and registers a [`Session`]; a failed one
//! returns it to `Locked` with a transient error and the entered code cleared.
//!
//! Sessions live in a [`SessionRegistry`] that is loaded from a JSON file at startup
//! and rewritten on every change, so a grant survives restarts until logout.
//! Display preferences are kept per member and survive logout.
use crate::stores::members::MemberStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Member, MemberProfile, StoreError, StoreResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: Uuid,
    pub member: MemberProfile,
    pub granted_at: DateTime<Utc>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.member.is_admin
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub dark_mode: bool,
    pub large_font: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Locked,
    Validating,
    Granted(Session),
}

#[derive(Debug)]
pub struct AccessGate {
    state: GateState,
    entered_code: String,
    error: Option<String>,
}

impl Default for AccessGate {
    fn default() -> Self {
        Self {
            state: GateState::Locked,
            entered_code: String::new(),
            error: None,
        }
    }
}

impl AccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate for an already persisted session, or a locked one.
    pub fn restore(session: Option<Session>) -> Self {
        match session {
            Some(session) => Self {
                state: GateState::Granted(session),
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn entered_code(&self) -> &str {
        &self.entered_code
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            GateState::Granted(session) => Some(session),
            _ => None,
        }
    }

    /// `Locked -> Validating`. Submissions in any other state are ignored.
    pub fn submit(&mut self, code: &str) -> bool {
        if self.state != GateState::Locked {
            return false;
        }
        self.entered_code = code.trim().to_string();
        self.error = None;
        self.state = GateState::Validating;
        true
    }

    /// `Validating -> Granted` with the new session, or `Validating -> Locked` on failure.
    pub fn resolve(&mut self, outcome: StoreResult<Session>) {
        if self.state != GateState::Validating {
            return;
        }
        match outcome {
            Ok(session) => {
                self.error = None;
                self.state = GateState::Granted(session);
            }
            Err(e) => {
                self.error = Some(e.to_string());
                self.entered_code.clear();
                self.state = GateState::Locked;
            }
        }
    }

    pub fn logout(&mut self) {
        *self = Self::default();
    }

    /// Runs a full unlock attempt against the member store, registering the session on success.
    pub async fn unlock(
        &mut self,
        code: &str,
        members: &MemberStore,
        sessions: &SessionRegistry,
    ) -> StoreResult<Session> {
        if !self.submit(code) {
            return Err(StoreError::Validation("El acceso ya está en curso".to_string()));
        }
        let outcome = match members.check_access(&self.entered_code).await {
            Ok(profile) => sessions.grant(profile).await,
            Err(e) => Err(e),
        };
        self.resolve(outcome.clone());
        outcome
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSessions {
    #[serde(default)]
    sessions: HashMap<Uuid, Session>,
    #[serde(default)]
    preferences: HashMap<Uuid, Preferences>,
}

/// Session contexts keyed by token.
pub struct SessionRegistry {
    path: Option<PathBuf>,
    state: RwLock<PersistedSessions>,
}

impl SessionRegistry {
    /// Registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(PersistedSessions::default()),
        }
    }

    /// Loads the registry from `path`; a missing file starts empty.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid session file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedSessions::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        info!(
            "Loaded {} sessions from {}",
            state.sessions.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub async fn grant(&self, member: MemberProfile) -> StoreResult<Session> {
        let session = Session {
            token: Uuid::new_v4(),
            member,
            granted_at: Utc::now(),
        };
        let mut state = self.state.write().await;
        state.sessions.insert(session.token, session.clone());
        self.persist(&state).await?;
        info!("Access granted to member {}", session.member.id);
        Ok(session)
    }

    pub async fn get(&self, token: Uuid) -> Option<Session> {
        self.state.read().await.sessions.get(&token).cloned()
    }

    /// Removes the session. Returns whether it existed.
    pub async fn revoke(&self, token: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let removed = state.sessions.remove(&token).is_some();
        if removed {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    /// Drops every session of a deleted member.
    pub async fn revoke_member(&self, member_id: Uuid) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.member.id != member_id);
        let removed = before - state.sessions.len();
        if removed > 0 {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    /// Keeps open sessions in step with an updated member record.
    pub async fn refresh_member(&self, member: &Member) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let mut touched = false;
        for session in state.sessions.values_mut().filter(|s| s.member.id == member.id) {
            session.member = member.profile();
            touched = true;
        }
        if touched {
            self.persist(&state).await?;
        }
        Ok(())
    }

    pub async fn preferences(&self, member_id: Uuid) -> Preferences {
        self.state
            .read()
            .await
            .preferences
            .get(&member_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn set_preferences(&self, member_id: Uuid, preferences: Preferences) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.preferences.insert(member_id, preferences);
        self.persist(&state).await
    }

    async fn persist(&self, state: &PersistedSessions) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(state).map_err(|e| StoreError::Remote(e.to_string()))?;
        // Written beside the live file, then renamed over it. Callers hold the write lock.
        let tmp = temp_path(path);
        let written = match tokio::fs::write(&tmp, json).await {
            Ok(()) => tokio::fs::rename(&tmp, path).await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            error!("Failed to write session file {}: {}", path.display(), e);
            StoreError::Remote(e.to_string())
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
