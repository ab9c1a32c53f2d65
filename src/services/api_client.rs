// src/services/api_client.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing;

use crate::{
    errors::{CabError, CabResult},
    models::{
        BookingRequest, Credentials, DriverProfile, DriverRegistration, PaymentReceipt,
        PaymentRequest, RatingRequest, Ride, RideStatus, UserProfile, UserRegistration,
    },
    session::SessionManager,
};

/// Remote collaborator contract for the cab-booking backend.
///
/// Fetch methods are safe to call repeatedly; the polling layer relies on
/// that. A missing resource surfaces as `CabError::NotFound` here and is
/// reclassified as benign absence by the session gate.
#[async_trait]
pub trait RideApi: Send + Sync {
    // Auth
    async fn register_user(&self, registration: &UserRegistration) -> CabResult<UserProfile>;
    async fn register_driver(&self, registration: &DriverRegistration) -> CabResult<DriverProfile>;
    async fn login_user(&self, credentials: &Credentials) -> CabResult<String>;
    async fn login_driver(&self, credentials: &Credentials) -> CabResult<String>;
    async fn user_profile(&self) -> CabResult<UserProfile>;
    async fn driver_profile(&self) -> CabResult<DriverProfile>;

    // User side
    async fn book_ride(&self, booking: &BookingRequest) -> CabResult<Ride>;
    async fn current_ride(&self) -> CabResult<Ride>;
    async fn ride_history(&self) -> CabResult<Vec<Ride>>;

    // Driver side
    async fn set_availability(&self, available: bool) -> CabResult<DriverProfile>;
    async fn available_rides(&self) -> CabResult<Vec<Ride>>;
    async fn accept_ride(&self, ride_id: i64) -> CabResult<Ride>;
    async fn update_ride_status(&self, status: RideStatus) -> CabResult<Ride>;
    async fn driver_current_ride(&self) -> CabResult<Ride>;
    async fn driver_ride_history(&self) -> CabResult<Vec<Ride>>;

    // Shared
    async fn ride_by_id(&self, ride_id: i64) -> CabResult<Ride>;

    // Post-ride
    async fn pay(&self, payment: &PaymentRequest) -> CabResult<PaymentReceipt>;
    async fn submit_rating(&self, rating: &RatingRequest) -> CabResult<()>;
}

/// reqwest-backed implementation against the REST backend.
pub struct HttpRideApi {
    base_url: String,
    client: reqwest::Client,
    session: Arc<SessionManager>,
}

impl HttpRideApi {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        session: Arc<SessionManager>,
    ) -> CabResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CabError::Configuration(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            session,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        // Bearer token on every call, like the old axios request interceptor.
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn classify(response: reqwest::Response) -> CabError {
        let status = response.status();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "no response body".to_string());
        match status {
            StatusCode::UNAUTHORIZED => CabError::Unauthorized(message),
            StatusCode::NOT_FOUND => CabError::NotFound(message),
            StatusCode::CONFLICT => CabError::Conflict(message),
            _ => CabError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> CabResult<T> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Ok(response.json::<T>().await?)
    }

    async fn send_text(&self, builder: RequestBuilder) -> CabResult<String> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Ok(response.text().await?)
    }

    async fn send_unit(&self, builder: RequestBuilder) -> CabResult<()> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Ok(())
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> CabResult<T> {
        self.send_json(self.request(Method::POST, path).json(body))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> CabResult<T> {
        self.send_json(self.request(Method::GET, path)).await
    }
}

#[async_trait]
impl RideApi for HttpRideApi {
    async fn register_user(&self, registration: &UserRegistration) -> CabResult<UserProfile> {
        self.post_json("/api/users/register", registration).await
    }

    async fn register_driver(&self, registration: &DriverRegistration) -> CabResult<DriverProfile> {
        self.post_json("/api/drivers/register", registration).await
    }

    async fn login_user(&self, credentials: &Credentials) -> CabResult<String> {
        // Login endpoints return the bare token, not a JSON envelope.
        self.send_text(self.request(Method::POST, "/api/users/login").json(credentials))
            .await
    }

    async fn login_driver(&self, credentials: &Credentials) -> CabResult<String> {
        self.send_text(self.request(Method::POST, "/api/drivers/login").json(credentials))
            .await
    }

    async fn user_profile(&self) -> CabResult<UserProfile> {
        self.get_json("/api/users/profile").await
    }

    async fn driver_profile(&self) -> CabResult<DriverProfile> {
        self.get_json("/api/drivers/profile").await
    }

    async fn book_ride(&self, booking: &BookingRequest) -> CabResult<Ride> {
        tracing::info!(
            "Booking ride {} -> {} ({} km)",
            booking.pickup_location,
            booking.dropoff_location,
            booking.distance
        );
        self.post_json("/api/users/book", booking).await
    }

    async fn current_ride(&self) -> CabResult<Ride> {
        self.get_json("/api/users/ride/current").await
    }

    async fn ride_history(&self) -> CabResult<Vec<Ride>> {
        self.get_json("/api/users/ride/history").await
    }

    async fn set_availability(&self, available: bool) -> CabResult<DriverProfile> {
        tracing::info!("Setting driver availability to {}", available);
        let path = format!("/api/drivers/availability?available={}", available);
        self.send_json(self.request(Method::POST, &path)).await
    }

    async fn available_rides(&self) -> CabResult<Vec<Ride>> {
        self.get_json("/api/drivers/rides/requests").await
    }

    async fn accept_ride(&self, ride_id: i64) -> CabResult<Ride> {
        tracing::info!("Accepting ride {}", ride_id);
        let path = format!("/api/drivers/rides/accept?rideId={}", ride_id);
        self.send_json(self.request(Method::POST, &path)).await
    }

    async fn update_ride_status(&self, status: RideStatus) -> CabResult<Ride> {
        tracing::info!("Updating current ride status to {}", status.as_str());
        let path = format!("/api/drivers/rides/status?status={}", status.as_str());
        self.send_json(self.request(Method::POST, &path)).await
    }

    async fn driver_current_ride(&self) -> CabResult<Ride> {
        self.get_json("/api/drivers/rides/current").await
    }

    async fn driver_ride_history(&self) -> CabResult<Vec<Ride>> {
        self.get_json("/api/drivers/rides/history").await
    }

    async fn ride_by_id(&self, ride_id: i64) -> CabResult<Ride> {
        self.get_json(&format!("/api/rides/{}", ride_id)).await
    }

    async fn pay(&self, payment: &PaymentRequest) -> CabResult<PaymentReceipt> {
        tracing::info!("Submitting payment for ride {}", payment.ride_id);
        self.post_json("/payment/pay", payment).await
    }

    async fn submit_rating(&self, rating: &RatingRequest) -> CabResult<()> {
        rating.validate()?;
        tracing::info!("Submitting rating for ride {}", rating.ride_id);
        self.send_unit(self.request(Method::POST, "/ratings/submit").json(rating))
            .await
    }
}
