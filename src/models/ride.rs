// src/models/ride.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CabError, CabResult, ValidationError};

/// Fare charged per kilometre, in rupees.
pub const FARE_PER_KM: f64 = 25.0;

/// Rough trip duration estimate: three minutes per kilometre.
pub const MINUTES_PER_KM: f64 = 3.0;

/// Shortest bookable trip. Anything closer is rejected before it reaches
/// the server.
pub const MIN_DISTANCE_KM: f64 = 0.5;

/// Longest bookable trip.
pub const MAX_DISTANCE_KM: f64 = 100.0;

/// Server-side ride lifecycle. Transitions are monotonic along
/// REQUESTED -> ACCEPTED -> IN_PROGRESS -> COMPLETED; a REQUESTED ride can
/// also simply disappear (cancelled or never taken), which the client treats
/// as "no active ride" rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Requested,
    Accepted,
    InProgress,
    Completed,
}

impl RideStatus {
    /// Wire form used by the status-update endpoint's query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "REQUESTED",
            RideStatus::Accepted => "ACCEPTED",
            RideStatus::InProgress => "IN_PROGRESS",
            RideStatus::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Cash,
    Upi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

/// Driver details attached to a ride once one has accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSummary {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub vehicle_details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRating {
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

/// A single booking from request to completion, as returned by the backend.
///
/// Field names match the backend's camelCase contract (`rideId`,
/// `pickupLocation`, ...). The legacy `source`/`destination` shape that some
/// old views used is not modeled; the backend contract is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub ride_id: i64,
    pub status: RideStatus,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub distance: f64,
    pub fare: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<RideRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
}

/// Payload for `POST /api/users/book`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub pickup_location: String,
    pub dropoff_location: String,
    pub distance: f64,
    pub fare: f64,
    pub status: RideStatus,
}

impl BookingRequest {
    /// Build a booking from a computed route. The fare is quoted locally
    /// from the distance; the server recomputes and is authoritative.
    pub fn new(
        pickup_location: impl Into<String>,
        dropoff_location: impl Into<String>,
        distance_km: f64,
    ) -> Self {
        Self {
            pickup_location: pickup_location.into(),
            dropoff_location: dropoff_location.into(),
            distance: distance_km,
            fare: quote_fare(distance_km),
            status: RideStatus::Requested,
        }
    }

    /// Client-side validation. A failing booking never reaches the server.
    pub fn validate(&self) -> CabResult<()> {
        let mut errors = Vec::new();

        if self.pickup_location.trim().is_empty() {
            errors.push(ValidationError {
                field: "pickupLocation".to_string(),
                message: "Pickup location is required".to_string(),
            });
        }
        if self.dropoff_location.trim().is_empty() {
            errors.push(ValidationError {
                field: "dropoffLocation".to_string(),
                message: "Dropoff location is required".to_string(),
            });
        }
        if !self.pickup_location.trim().is_empty()
            && self.pickup_location.trim() == self.dropoff_location.trim()
        {
            errors.push(ValidationError {
                field: "dropoffLocation".to_string(),
                message: "Pickup and dropoff locations must differ".to_string(),
            });
        }
        if self.distance < MIN_DISTANCE_KM {
            errors.push(ValidationError {
                field: "distance".to_string(),
                message: format!("Minimum trip distance is {} km", MIN_DISTANCE_KM),
            });
        }
        if self.distance > MAX_DISTANCE_KM {
            errors.push(ValidationError {
                field: "distance".to_string(),
                message: format!("Maximum trip distance is {} km", MAX_DISTANCE_KM),
            });
        }
        if self.fare < 0.0 {
            errors.push(ValidationError {
                field: "fare".to_string(),
                message: "Fare cannot be negative".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CabError::ValidationFailed(errors))
        }
    }
}

/// Payload for `POST /payment/pay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub ride_id: i64,
    pub amount: f64,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub ride_id: i64,
    pub amount: f64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
}

/// Payload for `POST /ratings/submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    pub ride_id: i64,
    pub driver_id: i64,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

impl RatingRequest {
    pub fn validate(&self) -> CabResult<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(CabError::validation_error(
                "rating",
                "Rating must be between 1 and 5",
            ));
        }
        Ok(())
    }
}

/// Quote a fare for a trip of the given length.
pub fn quote_fare(distance_km: f64) -> f64 {
    distance_km * FARE_PER_KM
}

/// Estimated trip duration in whole minutes.
pub fn estimate_duration_min(distance_km: f64) -> i64 {
    (distance_km * MINUTES_PER_KM).round() as i64
}

/// What the booking screen shows before the user confirms: the computed
/// fare and a rough time estimate for the trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripQuote {
    pub distance_km: f64,
    pub fare: f64,
    pub duration_min: i64,
}

impl TripQuote {
    pub fn for_distance(distance_km: f64) -> Self {
        Self {
            distance_km,
            fare: quote_fare(distance_km),
            duration_min: estimate_duration_min(distance_km),
        }
    }
}

/// The available-rides feed is treated as a set: order is irrelevant and the
/// backend may repeat entries across list variants, so deduplicate by ride id
/// keeping the first occurrence.
pub fn dedup_by_ride_id(mut rides: Vec<Ride>) -> Vec<Ride> {
    let mut seen = std::collections::HashSet::new();
    rides.retain(|ride| seen.insert(ride.ride_id));
    rides
}
