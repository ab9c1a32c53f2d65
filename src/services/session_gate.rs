// src/services/session_gate.rs
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing;

use crate::{
    errors::{CabError, CabResult},
    nav::{Navigator, Route},
    session::SessionManager,
};

/// Result payload of a gated fetch: either the resource, or a marker that it
/// legitimately does not exist right now. Absence is a valid domain state
/// ("no current ride"), never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Present(T),
    Absent,
}

impl<T> Fetched<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Fetched::Present(value) => Some(value),
            Fetched::Absent => None,
        }
    }

    pub fn into_present(self) -> Option<T> {
        match self {
            Fetched::Present(value) => Some(value),
            Fetched::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Fetched::Absent)
    }
}

/// Wraps every authenticated remote call and classifies its outcome into
/// exactly one of: present, absent (logical 404), unauthorized (session is
/// dead), or failed.
///
/// On unauthorized, the durable session is cleared and a redirect to login
/// fires exactly once, even when several concurrent calls hit 401 at the
/// same moment. The guard re-arms on the next successful login.
pub struct SessionGate {
    session: Arc<SessionManager>,
    navigator: Arc<dyn Navigator>,
    expired_fired: AtomicBool,
}

impl SessionGate {
    pub fn new(session: Arc<SessionManager>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            session,
            navigator,
            expired_fired: AtomicBool::new(false),
        }
    }

    /// Execute a remote call and classify the outcome.
    pub async fn call<T, F>(&self, invocation: F) -> CabResult<Fetched<T>>
    where
        F: Future<Output = CabResult<T>>,
    {
        match invocation.await {
            Ok(payload) => Ok(Fetched::Present(payload)),
            Err(CabError::NotFound(detail)) => {
                tracing::debug!("Resource absent: {}", detail);
                Ok(Fetched::Absent)
            }
            Err(CabError::Unauthorized(detail)) => {
                self.handle_unauthorized();
                Err(CabError::Unauthorized(detail))
            }
            Err(other) => Err(other),
        }
    }

    fn handle_unauthorized(&self) {
        // Single-fire: the first 401 wins, concurrent losers return without
        // touching the session again.
        if self.expired_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::warn!("Session expired, clearing credentials and redirecting to login");
        if let Err(err) = self.session.clear() {
            tracing::warn!("Failed to clear session after 401: {}", err);
        }
        self.navigator.navigate(Route::Login);
    }

    /// Re-arm the single-fire 401 guard. Called after a successful login.
    pub fn re_arm(&self) {
        self.expired_fired.store(false, Ordering::SeqCst);
    }
}
