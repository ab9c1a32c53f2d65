// src/nav.rs
use tracing;

/// Destinations the core logic can send the shell to. The actual routing
/// chrome lives outside this crate; flows only name where to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    UserDashboard,
    RideDetail,
    DriverDashboard,
}

/// Navigation side-effect seam. Flows and the session gate fire this on
/// state transitions; the embedding shell decides what a route change means.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only logs, for headless use.
#[derive(Debug, Default)]
pub struct NullNavigator;

impl Navigator for NullNavigator {
    fn navigate(&self, route: Route) {
        tracing::info!("Navigate to {:?}", route);
    }
}
