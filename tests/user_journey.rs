// tests/user_journey.rs
//
// End-to-end exercises of the user journey against a scripted in-process
// backend: book, wait for a driver, ride to completion, pay and rate.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use cabigo_client::errors::{CabError, CabResult};
use cabigo_client::models::{
    BookingRequest, Credentials, DriverProfile, DriverRegistration, DriverSummary, PaymentMethod,
    PaymentReceipt, PaymentRequest, PaymentStatus, RatingRequest, Ride, RideStatus, UserProfile,
    UserRegistration,
};
use cabigo_client::nav::{Navigator, Route};
use cabigo_client::services::actions::{ActionCoordinator, ActionOutcome};
use cabigo_client::services::api_client::RideApi;
use cabigo_client::services::polling::PollingSession;
use cabigo_client::services::ride_flow::{RideFlowConfig, SearchStatus, UserRideService};
use cabigo_client::services::session_gate::SessionGate;
use cabigo_client::services::state_machine::{FlowStep, RideState};
use cabigo_client::session::{MemorySessionStore, Role, SessionManager};

fn ride(id: i64, status: RideStatus) -> Ride {
    Ride {
        ride_id: id,
        status,
        pickup_location: "Airport".to_string(),
        dropoff_location: "Station".to_string(),
        distance: 5.0,
        fare: 125.0,
        requested_at: None,
        driver: Some(DriverSummary {
            id: 9,
            name: "Ravi".to_string(),
            phone: "555-0101".to_string(),
            vehicle_details: "Hatchback, Blue".to_string(),
            license_number: None,
        }),
        user: None,
        rating: None,
        payment_method: None,
        payment_status: None,
    }
}

/// Serves a scripted sequence of current-ride snapshots; the last entry
/// repeats. `None` plays as a 404.
struct ScriptedApi {
    script: Mutex<VecDeque<Option<Ride>>>,
    fetches: AtomicUsize,
    booked: Mutex<Vec<BookingRequest>>,
    payments: Mutex<Vec<PaymentRequest>>,
    ratings: Mutex<Vec<RatingRequest>>,
}

impl ScriptedApi {
    fn new(script: impl IntoIterator<Item = Option<Ride>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fetches: AtomicUsize::new(0),
            booked: Mutex::new(Vec::new()),
            payments: Mutex::new(Vec::new()),
            ratings: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RideApi for ScriptedApi {
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
        unimplemented!("not exercised")
    }
    async fn driver_profile(&self) -> CabResult<DriverProfile> {
        unimplemented!("not exercised")
    }

    async fn book_ride(&self, booking: &BookingRequest) -> CabResult<Ride> {
        self.booked.lock().unwrap().push(booking.clone());
        let mut requested = ride(42, RideStatus::Requested);
        requested.distance = booking.distance;
        requested.fare = booking.fare;
        Ok(requested)
    }

    async fn current_ride(&self) -> CabResult<Ride> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let step = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match step {
            Some(Some(ride)) => Ok(ride),
            _ => Err(CabError::not_found("no active ride")),
        }
    }

    async fn ride_history(&self) -> CabResult<Vec<Ride>> {
        Ok(vec![
            ride(1, RideStatus::Completed),
            ride(2, RideStatus::Completed),
            ride(1, RideStatus::Completed),
        ])
    }

    async fn set_availability(&self, _a: bool) -> CabResult<DriverProfile> {
        unimplemented!("not exercised")
    }
    async fn available_rides(&self) -> CabResult<Vec<Ride>> {
        unimplemented!("not exercised")
    }
    async fn accept_ride(&self, _id: i64) -> CabResult<Ride> {
        unimplemented!("not exercised")
    }
    async fn update_ride_status(&self, _s: RideStatus) -> CabResult<Ride> {
        unimplemented!("not exercised")
    }
    async fn driver_current_ride(&self) -> CabResult<Ride> {
        unimplemented!("not exercised")
    }
    async fn driver_ride_history(&self) -> CabResult<Vec<Ride>> {
        unimplemented!("not exercised")
    }
    async fn ride_by_id(&self, _id: i64) -> CabResult<Ride> {
        unimplemented!("not exercised")
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
        self.ratings.lock().unwrap().push(rating.clone());
        Ok(())
    }
}

struct CountingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl CountingNavigator {
    fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
        }
    }

    fn visits(&self, route: Route) -> usize {
        self.routes.lock().unwrap().iter().filter(|r| **r == route).count()
    }
}

impl Navigator for CountingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

fn harness(api: Arc<ScriptedApi>) -> (UserRideService, Arc<CountingNavigator>, Arc<PollingSession>) {
    let session = Arc::new(SessionManager::new(Box::new(MemorySessionStore::default())));
    session.set_session("tok", Role::User).unwrap();
    let navigator = Arc::new(CountingNavigator::new());
    let gate = Arc::new(SessionGate::new(session, navigator.clone()));
    let polls = Arc::new(PollingSession::new());
    let service = UserRideService::new(
        api,
        gate,
        polls.clone(),
        Arc::new(ActionCoordinator::new()),
        navigator.clone(),
        RideFlowConfig {
            current_ride_interval: Duration::from_millis(10),
            search_interval: Duration::from_millis(10),
            search_window: Duration::from_secs(60),
        },
    );
    (service, navigator, polls)
}

#[tokio::test]
async fn test_booking_sends_quoted_fare() {
    let api = Arc::new(ScriptedApi::new([None]));
    let (service, _, _) = harness(api.clone());

    let booking = BookingRequest::new("Airport", "Station", 5.0);
    let outcome = service.book_ride(&booking).await.unwrap();
    let confirmed = outcome.completed().unwrap();
    assert_eq!(confirmed.ride_id, 42);
    assert_eq!(confirmed.status, RideStatus::Requested);

    let booked = api.booked.lock().unwrap();
    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0].distance, 5.0);
    assert_eq!(booked[0].fare, 125.0);
}

#[tokio::test]
async fn test_driver_search_lands_on_ride_view_once() {
    let api = Arc::new(ScriptedApi::new([
        None,
        Some(ride(42, RideStatus::Requested)),
        Some(ride(42, RideStatus::Requested)),
        Some(ride(42, RideStatus::Accepted)),
    ]));
    let (service, navigator, polls) = harness(api.clone());

    let search = service.start_driver_search().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(search.status(), SearchStatus::DriverFound);
    assert_eq!(navigator.visits(Route::RideDetail), 1);
    assert_eq!(polls.live_count(), 0);
    assert!(api.fetches.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn test_completion_flow_pays_rates_and_returns_home() {
    let api = Arc::new(ScriptedApi::new([
        Some(ride(42, RideStatus::InProgress)),
        Some(ride(42, RideStatus::Completed)),
    ]));
    let (service, navigator, _) = harness(api.clone());

    let watch = service.start_current_ride_watch().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(watch.current_state(), RideState::Completed);
    assert_eq!(watch.subflow_step(), Some(FlowStep::Payment));

    // The ride poll holds its ticks while the sub-flow is on screen.
    let fetches = api.fetches.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(api.fetches.load(Ordering::SeqCst), fetches);

    let receipt = watch
        .pay(PaymentMethod::Card)
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(receipt.amount, 125.0);
    assert_eq!(receipt.status, PaymentStatus::Paid);
    assert_eq!(watch.subflow_step(), Some(FlowStep::Rating));

    let rated = watch.submit_rating(5, Some("Great trip".to_string())).await.unwrap();
    assert!(matches!(rated, ActionOutcome::Completed(())));
    assert_eq!(api.ratings.lock().unwrap()[0].driver_id, 9);

    assert_eq!(watch.subflow_step(), Some(FlowStep::Done));
    assert_eq!(navigator.visits(Route::UserDashboard), 1);
    assert!(!watch.is_polling());
}

#[tokio::test]
async fn test_skip_rating_also_returns_home() {
    let api = Arc::new(ScriptedApi::new([Some(ride(42, RideStatus::Completed))]));
    let (service, navigator, _) = harness(api.clone());

    let watch = service.start_current_ride_watch().unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(watch.subflow_step(), Some(FlowStep::Payment));

    watch.pay(PaymentMethod::Upi).await.unwrap();
    watch.skip_rating().unwrap();

    assert!(api.ratings.lock().unwrap().is_empty());
    assert_eq!(navigator.visits(Route::UserDashboard), 1);
}

#[tokio::test]
async fn test_history_collapses_duplicate_rides() {
    let api = Arc::new(ScriptedApi::new([None]));
    let (service, _, _) = harness(api);

    let history = service.ride_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].ride_id, 1);
    assert_eq!(history[1].ride_id, 2);
}
