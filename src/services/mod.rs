// src/services/mod.rs
pub mod actions;
pub mod api_client;
pub mod auth_service;
pub mod driver_flow;
pub mod polling;
pub mod ride_flow;
pub mod session_gate;
pub mod state_machine;
