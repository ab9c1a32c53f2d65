// src/main.rs
//
// Headless demo shell: logs in with credentials from the environment and
// watches the current ride until interrupted. The real UI embeds the
// library crate and supplies its own Navigator.
use std::sync::Arc;

use cabigo_client::{
    AppConfig, AppState, CabError, CabResult, NullNavigator,
    models::Credentials,
    session::Role,
};

#[tokio::main]
async fn main() -> CabResult<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env();
    let state = AppState::new(config, Arc::new(NullNavigator))?;

    if !state.auth.is_authenticated() {
        let credentials = Credentials {
            email: env_required("CABIGO_EMAIL")?,
            password: env_required("CABIGO_PASSWORD")?,
        };
        match std::env::var("CABIGO_ROLE").as_deref() {
            Ok("driver") => state.auth.login_driver(&credentials).await?,
            _ => state.auth.login_user(&credentials).await?,
        }
    }

    match state.auth.role() {
        Some(Role::Driver) => {
            let online = state.auth.bootstrap_driver_availability().await?;
            state.driver.set_online(online);
            state.driver.start_available_rides_poll()?;
            state.driver.start_current_ride_watch()?;
            tracing::info!("Watching driver feeds (online: {})", online);
        }
        _ => {
            state.user_rides.start_current_ride_watch()?;
            tracing::info!("Watching current ride");
        }
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CabError::Configuration(e.to_string()))?;
    tracing::info!("Shutting down");
    state.polls.stop_all();
    Ok(())
}

fn env_required(key: &str) -> CabResult<String> {
    std::env::var(key).map_err(|_| CabError::Configuration(format!("{} must be set", key)))
}
