// src/services/auth_service.rs
use std::sync::Arc;

use tracing;

use crate::{
    errors::CabResult,
    models::{Credentials, DriverProfile, DriverRegistration, UserProfile, UserRegistration},
    services::api_client::RideApi,
    services::polling::PollingSession,
    services::session_gate::{Fetched, SessionGate},
    session::{Role, SessionManager},
};

/// Authentication entry points. The only component besides the gate's 401
/// handler that writes token and role into the session.
pub struct AuthService {
    api: Arc<dyn RideApi>,
    session: Arc<SessionManager>,
    gate: Arc<SessionGate>,
    polls: Arc<PollingSession>,
}

impl AuthService {
    pub fn new(
        api: Arc<dyn RideApi>,
        session: Arc<SessionManager>,
        gate: Arc<SessionGate>,
        polls: Arc<PollingSession>,
    ) -> Self {
        Self {
            api,
            session,
            gate,
            polls,
        }
    }

    pub async fn register_user(&self, registration: &UserRegistration) -> CabResult<UserProfile> {
        self.api.register_user(registration).await
    }

    pub async fn register_driver(
        &self,
        registration: &DriverRegistration,
    ) -> CabResult<DriverProfile> {
        self.api.register_driver(registration).await
    }

    pub async fn login_user(&self, credentials: &Credentials) -> CabResult<()> {
        let token = self.api.login_user(credentials).await?;
        self.session.set_session(token, Role::User)?;
        self.gate.re_arm();
        Ok(())
    }

    pub async fn login_driver(&self, credentials: &Credentials) -> CabResult<()> {
        let token = self.api.login_driver(credentials).await?;
        self.session.set_session(token, Role::Driver)?;
        self.gate.re_arm();
        Ok(())
    }

    /// Local only: tears down all polling and drops the stored session. The
    /// backend keeps no server-side session to invalidate.
    pub fn logout(&self) -> CabResult<()> {
        tracing::info!("Logging out");
        self.polls.stop_all();
        self.session.clear()
    }

    pub async fn user_profile(&self) -> CabResult<Fetched<UserProfile>> {
        self.gate.call(self.api.user_profile()).await
    }

    pub async fn driver_profile(&self) -> CabResult<Fetched<DriverProfile>> {
        self.gate.call(self.api.driver_profile()).await
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn role(&self) -> Option<Role> {
        self.session.role()
    }

    /// Resynchronize the driver's online flag at session start. A durable
    /// local override wins; otherwise the server profile value is adopted
    /// and cached.
    pub async fn bootstrap_driver_availability(&self) -> CabResult<bool> {
        match self.gate.call(self.api.driver_profile()).await? {
            Fetched::Present(profile) => self.session.resolve_availability(profile.available),
            Fetched::Absent => {
                tracing::warn!("Driver profile missing during availability bootstrap");
                Ok(self.session.cached_availability().unwrap_or(false))
            }
        }
    }
}
