// src/test_support.rs
//
// Scripted in-process stand-in for the backend, shared by the flow unit
// tests.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::errors::{CabError, CabResult};
use crate::models::{
    BookingRequest, Credentials, DriverProfile, DriverRegistration, PaymentReceipt,
    PaymentRequest, PaymentStatus, RatingRequest, Ride, RideStatus, UserProfile,
    UserRegistration,
};
use crate::nav::{Navigator, Route};
use crate::services::api_client::RideApi;

pub fn ride(id: i64, status: RideStatus) -> Ride {
    Ride {
        ride_id: id,
        status,
        pickup_location: "Airport".to_string(),
        dropoff_location: "Station".to_string(),
        distance: 5.0,
        fare: 125.0,
        requested_at: None,
        driver: None,
        user: None,
        rating: None,
        payment_method: None,
        payment_status: None,
    }
}

/// One step of a scripted current-ride feed.
#[derive(Debug, Clone)]
pub enum ScriptedFetch {
    Ride(Ride),
    Absent,
}

/// Pops steps in order; the last step repeats forever, so a poll that keeps
/// running keeps seeing the final state.
#[derive(Debug, Default)]
pub struct ScriptQueue {
    steps: Mutex<VecDeque<ScriptedFetch>>,
    pub fetches: AtomicUsize,
}

impl ScriptQueue {
    pub fn push(&self, step: ScriptedFetch) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn next(&self) -> CabResult<Ride> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut steps = self.steps.lock().unwrap();
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        };
        match step {
            Some(ScriptedFetch::Ride(ride)) => Ok(ride),
            Some(ScriptedFetch::Absent) | None => Err(CabError::not_found("no active ride")),
        }
    }
}

pub struct RecordingNavigator {
    pub routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
        }
    }

    pub fn visits(&self, route: Route) -> usize {
        self.routes.lock().unwrap().iter().filter(|r| **r == route).count()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

/// Scripted backend fake.
pub struct FakeRideApi {
    pub current_ride_script: ScriptQueue,
    pub driver_current_ride_script: ScriptQueue,
    pub available: Mutex<Vec<Ride>>,
    pub available_fetches: AtomicUsize,
    pub conflict_on_accept: Mutex<bool>,
    pub driver_ride_unreachable: Mutex<bool>,
    pub server_available: Mutex<bool>,
    pub booked: Mutex<Vec<BookingRequest>>,
    pub payments: Mutex<Vec<PaymentRequest>>,
    pub ratings: Mutex<Vec<RatingRequest>>,
}

impl FakeRideApi {
    pub fn new() -> Self {
        Self {
            current_ride_script: ScriptQueue::default(),
            driver_current_ride_script: ScriptQueue::default(),
            available: Mutex::new(Vec::new()),
            available_fetches: AtomicUsize::new(0),
            conflict_on_accept: Mutex::new(false),
            driver_ride_unreachable: Mutex::new(false),
            server_available: Mutex::new(false),
            booked: Mutex::new(Vec::new()),
            payments: Mutex::new(Vec::new()),
            ratings: Mutex::new(Vec::new()),
        }
    }

    fn profile(&self) -> DriverProfile {
        DriverProfile {
            id: 9,
            name: "Ravi".to_string(),
            email: "ravi@example.com".to_string(),
            phone: "555-0101".to_string(),
            license_number: "DL-42".to_string(),
            vehicle_details: "Hatchback, Blue".to_string(),
            available: *self.server_available.lock().unwrap(),
        }
    }
}

#[async_trait]
impl RideApi for FakeRideApi {
    async fn register_user(&self, _r: &UserRegistration) -> CabResult<UserProfile> {
        unimplemented!("not exercised")
    }

    async fn register_driver(&self, _r: &DriverRegistration) -> CabResult<DriverProfile> {
        unimplemented!("not exercised")
    }

    async fn login_user(&self, _c: &Credentials) -> CabResult<String> {
        Ok("user-token".to_string())
    }

    async fn login_driver(&self, _c: &Credentials) -> CabResult<String> {
        Ok("driver-token".to_string())
    }

    async fn user_profile(&self) -> CabResult<UserProfile> {
        Ok(UserProfile {
            id: 4,
            name: "Meera".to_string(),
            email: "meera@example.com".to_string(),
            phone: "555-0102".to_string(),
        })
    }

    async fn driver_profile(&self) -> CabResult<DriverProfile> {
        Ok(self.profile())
    }

    async fn book_ride(&self, booking: &BookingRequest) -> CabResult<Ride> {
        self.booked.lock().unwrap().push(booking.clone());
        Ok(Ride {
            ride_id: 101,
            status: RideStatus::Requested,
            pickup_location: booking.pickup_location.clone(),
            dropoff_location: booking.dropoff_location.clone(),
            distance: booking.distance,
            fare: booking.fare,
            requested_at: None,
            driver: None,
            user: None,
            rating: None,
            payment_method: None,
            payment_status: None,
        })
    }

    async fn current_ride(&self) -> CabResult<Ride> {
        self.current_ride_script.next()
    }

    async fn ride_history(&self) -> CabResult<Vec<Ride>> {
        Ok(Vec::new())
    }

    async fn set_availability(&self, available: bool) -> CabResult<DriverProfile> {
        *self.server_available.lock().unwrap() = available;
        Ok(self.profile())
    }

    async fn available_rides(&self) -> CabResult<Vec<Ride>> {
        self.available_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.available.lock().unwrap().clone())
    }

    async fn accept_ride(&self, ride_id: i64) -> CabResult<Ride> {
        if *self.conflict_on_accept.lock().unwrap() {
            return Err(CabError::conflict("ride already assigned to another driver"));
        }
        let mut accepted = ride(ride_id, RideStatus::Accepted);
        accepted.ride_id = ride_id;
        Ok(accepted)
    }

    async fn update_ride_status(&self, status: RideStatus) -> CabResult<Ride> {
        Ok(ride(55, status))
    }

    async fn driver_current_ride(&self) -> CabResult<Ride> {
        if *self.driver_ride_unreachable.lock().unwrap() {
            return Err(CabError::NetworkTimeout);
        }
        self.driver_current_ride_script.next()
    }

    async fn driver_ride_history(&self) -> CabResult<Vec<Ride>> {
        Ok(Vec::new())
    }

    async fn ride_by_id(&self, ride_id: i64) -> CabResult<Ride> {
        self.current_ride_script.next().map(|mut r| {
            r.ride_id = ride_id;
            r
        })
    }

    async fn pay(&self, payment: &PaymentRequest) -> CabResult<PaymentReceipt> {
        self.payments.lock().unwrap().push(payment.clone());
        Ok(PaymentReceipt {
            ride_id: payment.ride_id,
            amount: payment.amount,
            method: payment.method,
            status: PaymentStatus::Paid,
        })
    }

    async fn submit_rating(&self, rating: &RatingRequest) -> CabResult<()> {
        rating.validate()?;
        self.ratings.lock().unwrap().push(rating.clone());
        Ok(())
    }
}
