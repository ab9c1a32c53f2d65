// src/state.rs
use std::sync::Arc;
use std::time::Duration;

use crate::{
    errors::{CabError, CabResult},
    nav::Navigator,
    services::actions::ActionCoordinator,
    services::api_client::{HttpRideApi, RideApi},
    services::auth_service::AuthService,
    services::driver_flow::{DriverFlowConfig, DriverService},
    services::polling::PollingSession,
    services::ride_flow::{RideFlowConfig, UserRideService},
    services::session_gate::SessionGate,
    session::{FileSessionStore, SessionManager},
};

#[derive(Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub session_file: String,
    pub request_timeout: Duration,
    pub current_ride_interval: Duration,
    pub available_rides_interval: Duration,
    pub driver_search_interval: Duration,
    pub driver_search_window: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api_base_url: std::env::var("CABIGO_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            session_file: std::env::var("CABIGO_SESSION_FILE")
                .unwrap_or_else(|_| ".cabigo-session.json".to_string()),
            request_timeout: env_secs("CABIGO_REQUEST_TIMEOUT_SECS", 10),
            current_ride_interval: env_secs("CABIGO_RIDE_POLL_SECS", 5),
            available_rides_interval: env_secs("CABIGO_RIDES_POLL_SECS", 10),
            driver_search_interval: env_secs("CABIGO_SEARCH_POLL_SECS", 3),
            driver_search_window: env_secs("CABIGO_SEARCH_WINDOW_SECS", 300),
        }
    }
}

fn env_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

pub struct AppState {
    pub session: Arc<SessionManager>,
    pub api: Arc<dyn RideApi>,
    pub gate: Arc<SessionGate>,
    pub polls: Arc<PollingSession>,
    pub actions: Arc<ActionCoordinator>,
    pub auth: Arc<AuthService>,
    pub user_rides: Arc<UserRideService>,
    pub driver: Arc<DriverService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, navigator: Arc<dyn Navigator>) -> CabResult<Self> {
        if config.api_base_url.trim().is_empty() {
            return Err(CabError::Configuration(
                "api_base_url must not be empty".to_string(),
            ));
        }

        let session = Arc::new(SessionManager::new(Box::new(FileSessionStore::new(
            &config.session_file,
        ))));
        let api: Arc<dyn RideApi> = Arc::new(HttpRideApi::new(
            &config.api_base_url,
            config.request_timeout,
            session.clone(),
        )?);
        let gate = Arc::new(SessionGate::new(session.clone(), navigator.clone()));
        let polls = Arc::new(PollingSession::new());
        let actions = Arc::new(ActionCoordinator::new());

        let auth = Arc::new(AuthService::new(
            api.clone(),
            session.clone(),
            gate.clone(),
            polls.clone(),
        ));
        let user_rides = Arc::new(UserRideService::new(
            api.clone(),
            gate.clone(),
            polls.clone(),
            actions.clone(),
            navigator.clone(),
            RideFlowConfig {
                current_ride_interval: config.current_ride_interval,
                search_interval: config.driver_search_interval,
                search_window: config.driver_search_window,
            },
        ));
        let driver = Arc::new(DriverService::new(
            api.clone(),
            gate.clone(),
            polls.clone(),
            actions.clone(),
            navigator,
            session.clone(),
            DriverFlowConfig {
                available_rides_interval: config.available_rides_interval,
                current_ride_interval: config.current_ride_interval,
            },
        ));

        Ok(Self {
            session,
            api,
            gate,
            polls,
            actions,
            auth,
            user_rides,
            driver,
            config,
        })
    }
}
