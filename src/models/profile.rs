// src/models/profile.rs
use serde::{Deserialize, Serialize};

/// Login payload, shared by the user and driver endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistration {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRegistration {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub license_number: String,
    pub vehicle_details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Driver profile as returned by `GET /api/drivers/profile`.
///
/// The backend serializes the online flag as `available`; older client code
/// renamed it ad hoc per page, so it is normalized once here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub license_number: String,
    pub vehicle_details: String,
    pub available: bool,
}
