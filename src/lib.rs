// src/lib.rs
pub mod errors;
pub mod models;
pub mod nav;
pub mod services;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use errors::{CabError, CabResult, ValidationError};
pub use nav::{Navigator, NullNavigator, Route};
pub use state::{AppConfig, AppState};
