// src/session.rs
//
// Durable client session state: the auth token, the role it was issued for,
// and the driver's cached availability flag. All writes go through
// SessionManager; login, logout, the gate's 401 handler and the availability
// toggle are the only callers that mutate it. Nothing writes session state
// speculatively before server confirmation.
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing;

use crate::errors::{CabError, CabResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Driver,
}

/// What actually gets persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub token: String,
    pub role: Role,
    /// Driver-side online flag, mirrored so a restart preserves it without
    /// re-querying. None means "no local override; the server value wins".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_available: Option<bool>,
}

/// Backing store for the persisted session.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> CabResult<Option<PersistedSession>>;
    fn save(&self, session: &PersistedSession) -> CabResult<()>;
    fn clear(&self) -> CabResult<()>;
}

/// In-memory store, used by tests and as a fallback.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: RwLock<Option<PersistedSession>>,
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> CabResult<Option<PersistedSession>> {
        Ok(self.inner.read().expect("session store lock poisoned").clone())
    }

    fn save(&self, session: &PersistedSession) -> CabResult<()> {
        *self.inner.write().expect("session store lock poisoned") = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> CabResult<()> {
        *self.inner.write().expect("session store lock poisoned") = None;
        Ok(())
    }
}

/// JSON file store used by the binary.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> CabResult<Option<PersistedSession>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let session = serde_json::from_str(&contents)?;
                Ok(Some(session))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CabError::SessionStorage(err.to_string())),
        }
    }

    fn save(&self, session: &PersistedSession) -> CabResult<()> {
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, contents)
            .map_err(|err| CabError::SessionStorage(err.to_string()))
    }

    fn clear(&self) -> CabResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CabError::SessionStorage(err.to_string())),
        }
    }
}

/// Single mutation authority for session state.
///
/// Keeps a process-wide copy of the persisted session so reads never touch
/// the store, and writes through on every mutation.
pub struct SessionManager {
    store: Box<dyn SessionStore>,
    current: RwLock<Option<PersistedSession>>,
}

impl SessionManager {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        let current = match store.load() {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!("Failed to load persisted session: {}", err);
                None
            }
        };
        Self {
            store,
            current: RwLock::new(current),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.current
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.token.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.current
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.role)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().expect("session lock poisoned").is_some()
    }

    /// Called by login after the server issued a token.
    pub fn set_session(&self, token: impl Into<String>, role: Role) -> CabResult<()> {
        let session = PersistedSession {
            token: token.into(),
            role,
            driver_available: None,
        };
        self.store.save(&session)?;
        *self.current.write().expect("session lock poisoned") = Some(session);
        tracing::info!("Session established for role {:?}", role);
        Ok(())
    }

    /// Called by logout and by the gate's 401 handler. Clearing an already
    /// empty session is a no-op.
    pub fn clear(&self) -> CabResult<()> {
        self.store.clear()?;
        *self.current.write().expect("session lock poisoned") = None;
        tracing::info!("Session cleared");
        Ok(())
    }

    pub fn cached_availability(&self) -> Option<bool> {
        self.current
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .and_then(|s| s.driver_available)
    }

    /// Called by the availability toggle after the server confirmed the
    /// change. Ignored when no session exists.
    pub fn set_cached_availability(&self, available: bool) -> CabResult<()> {
        let mut guard = self.current.write().expect("session lock poisoned");
        if let Some(session) = guard.as_mut() {
            session.driver_available = Some(available);
            self.store.save(session)?;
        }
        Ok(())
    }

    /// Availability at session start: a durable local override wins,
    /// otherwise the server profile value is taken and cached.
    pub fn resolve_availability(&self, server_value: bool) -> CabResult<bool> {
        match self.cached_availability() {
            Some(cached) => Ok(cached),
            None => {
                self.set_cached_availability(server_value)?;
                Ok(server_value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(Box::new(MemorySessionStore::default()))
    }

    #[test]
    fn test_login_logout_roundtrip() {
        let session = manager();
        assert!(!session.is_authenticated());

        session.set_session("tok-1", Role::User).unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("tok-1"));
        assert_eq!(session.role(), Some(Role::User));

        session.clear().unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);
        assert_eq!(session.role(), None);
    }

    #[test]
    fn test_availability_server_value_wins_without_override() {
        let session = manager();
        session.set_session("tok-1", Role::Driver).unwrap();

        assert_eq!(session.cached_availability(), None);
        assert!(session.resolve_availability(true).unwrap());
        // Now cached; a later server value no longer overrides it.
        assert!(session.resolve_availability(false).unwrap());
    }

    #[test]
    fn test_availability_local_override_wins() {
        let session = manager();
        session.set_session("tok-1", Role::Driver).unwrap();
        session.set_cached_availability(false).unwrap();

        assert!(!session.resolve_availability(true).unwrap());
    }

    #[test]
    fn test_new_session_drops_stale_availability() {
        let session = manager();
        session.set_session("tok-1", Role::Driver).unwrap();
        session.set_cached_availability(true).unwrap();

        session.set_session("tok-2", Role::Driver).unwrap();
        assert_eq!(session.cached_availability(), None);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "cabigo-session-test-{}.json",
            std::process::id()
        ));
        let store = FileSessionStore::new(&path);
        store.clear().unwrap();

        assert!(store.load().unwrap().is_none());

        let session = PersistedSession {
            token: "tok-file".to_string(),
            role: Role::Driver,
            driver_available: Some(true),
        };
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
