// src/services/ride_flow.rs
//
// User-side wiring: booking with the post-booking driver search, and the
// current-ride watch with its payment/rating sub-flow. This is where the
// polling loops, the state machine, the gate and the action coordinator
// meet.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing;

use crate::{
    errors::{CabError, CabResult},
    models::{
        self, BookingRequest, PaymentMethod, PaymentReceipt, PaymentRequest, RatingRequest, Ride,
        TripQuote,
    },
    nav::{Navigator, Route},
    services::actions::{ActionCoordinator, ActionKind, ActionOutcome},
    services::api_client::RideApi,
    services::polling::{FailureMode, PollHandle, PollKey, PollResource, PollingSession},
    services::session_gate::{Fetched, SessionGate},
    services::state_machine::{FlowStep, PostRideFlow, RideState, RideStateMachine},
};

/// Poll cadences and the bound on the post-booking driver search.
#[derive(Debug, Clone)]
pub struct RideFlowConfig {
    pub current_ride_interval: Duration,
    pub search_interval: Duration,
    pub search_window: Duration,
}

impl Default for RideFlowConfig {
    fn default() -> Self {
        Self {
            current_ride_interval: Duration::from_secs(5),
            search_interval: Duration::from_secs(3),
            search_window: Duration::from_secs(300),
        }
    }
}

/// Where the post-booking driver search currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Searching,
    DriverFound,
    Expired,
}

/// A running post-booking driver search. Stops itself once a driver is
/// found or the search window closes.
pub struct RideSearch {
    handle: PollHandle,
    status: Arc<Mutex<SearchStatus>>,
}

impl RideSearch {
    pub fn status(&self) -> SearchStatus {
        *self.status.lock().expect("search status lock poisoned")
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    pub fn stop(&self, polls: &PollingSession) {
        polls.stop(&self.handle);
    }
}

/// User-side ride operations.
pub struct UserRideService {
    api: Arc<dyn RideApi>,
    gate: Arc<SessionGate>,
    polls: Arc<PollingSession>,
    actions: Arc<ActionCoordinator>,
    navigator: Arc<dyn Navigator>,
    config: RideFlowConfig,
}

impl UserRideService {
    pub fn new(
        api: Arc<dyn RideApi>,
        gate: Arc<SessionGate>,
        polls: Arc<PollingSession>,
        actions: Arc<ActionCoordinator>,
        navigator: Arc<dyn Navigator>,
        config: RideFlowConfig,
    ) -> Self {
        Self {
            api,
            gate,
            polls,
            actions,
            navigator,
            config,
        }
    }

    /// Fare and time estimate for the booking screen, computed locally
    /// before anything is sent.
    pub fn quote(&self, distance_km: f64) -> TripQuote {
        TripQuote::for_distance(distance_km)
    }

    /// Book a ride. Validation failures never reach the server; re-entrant
    /// booking attempts are ignored while one is pending.
    pub async fn book_ride(&self, booking: &BookingRequest) -> CabResult<ActionOutcome<Ride>> {
        booking.validate()?;
        self.actions
            .run(ActionKind::BookRide, None, self.api.book_ride(booking))
            .await
    }

    /// Start the post-booking driver search: poll the current ride until a
    /// driver accepts, then navigate to the ride detail view exactly once
    /// and stop. The search gives up silently after the configured window.
    pub fn start_driver_search(&self) -> CabResult<RideSearch> {
        let status = Arc::new(Mutex::new(SearchStatus::Searching));
        let navigated = Arc::new(AtomicBool::new(false));
        let machine = Arc::new(Mutex::new(RideStateMachine::new()));
        let handle_slot: Arc<Mutex<Option<PollHandle>>> = Arc::new(Mutex::new(None));
        let deadline = Instant::now() + self.config.search_window;

        let api = Arc::clone(&self.api);
        let gate = Arc::clone(&self.gate);
        let fetcher = move || {
            let api = Arc::clone(&api);
            let gate = Arc::clone(&gate);
            async move { gate.call(api.current_ride()).await }.boxed()
        };

        let enabled_navigated = Arc::clone(&navigated);
        let enabled_status = Arc::clone(&status);
        let enabled_slot = Arc::clone(&handle_slot);
        let enabled_polls = Arc::clone(&self.polls);
        let enabled = move || {
            if enabled_navigated.load(Ordering::SeqCst) {
                return false;
            }
            if Instant::now() >= deadline {
                let mut status = enabled_status.lock().expect("search status lock poisoned");
                if *status == SearchStatus::Searching {
                    tracing::info!("Driver search window elapsed with no driver");
                    *status = SearchStatus::Expired;
                }
                drop(status);
                // The window closing ends the search outright; the timer
                // must not keep ticking behind a false predicate.
                if let Some(handle) = enabled_slot
                    .lock()
                    .expect("search handle lock poisoned")
                    .take()
                {
                    enabled_polls.stop(&handle);
                }
                return false;
            }
            true
        };

        let reconcile_status = Arc::clone(&status);
        let reconcile_machine = Arc::clone(&machine);
        let reconcile_slot = Arc::clone(&handle_slot);
        let reconcile_polls = Arc::clone(&self.polls);
        let navigator = Arc::clone(&self.navigator);
        let reconcile = move |outcome: CabResult<Fetched<Ride>>| {
            let Ok(snapshot) = outcome else {
                return;
            };
            let transition = reconcile_machine
                .lock()
                .expect("search machine lock poisoned")
                .observe(&snapshot);
            let Some(transition) = transition else {
                return;
            };
            if transition.to != RideState::Accepted {
                return;
            }
            // Debounced to a single navigation even if a late snapshot
            // repeats the transition.
            if navigated.swap(true, Ordering::SeqCst) {
                return;
            }
            *reconcile_status.lock().expect("search status lock poisoned") =
                SearchStatus::DriverFound;
            tracing::info!("Driver found, leaving search");
            if let Some(handle) = reconcile_slot
                .lock()
                .expect("search handle lock poisoned")
                .take()
            {
                reconcile_polls.stop(&handle);
            }
            navigator.navigate(Route::RideDetail);
        };

        // During the search the current ride is an optional resource; a
        // flaky fetch just means we look again in a few seconds.
        let handle = self.polls.start(
            PollKey::new("user", PollResource::DriverSearch),
            self.config.search_interval,
            FailureMode::Swallow,
            fetcher,
            enabled,
            reconcile,
        )?;
        *handle_slot.lock().expect("search handle lock poisoned") = Some(handle.clone());

        Ok(RideSearch { handle, status })
    }

    /// Start watching the current ride, including the completion sub-flow.
    pub fn start_current_ride_watch(&self) -> CabResult<CurrentRideWatch> {
        let state = Arc::new(WatchState {
            machine: Mutex::new(RideStateMachine::new()),
            subflow: Mutex::new(None),
            latest: Mutex::new(None),
            last_error: Mutex::new(None),
        });

        let api = Arc::clone(&self.api);
        let gate = Arc::clone(&self.gate);
        let fetcher = move || {
            let api = Arc::clone(&api);
            let gate = Arc::clone(&gate);
            async move { gate.call(api.current_ride()).await }.boxed()
        };

        // The whole point of the suspension: while payment or rating is on
        // screen, the ride poll must not run, so a ride that disappears
        // server-side cannot abort the sub-flow.
        let enabled_state = Arc::clone(&state);
        let enabled = move || {
            enabled_state
                .subflow
                .lock()
                .expect("subflow lock poisoned")
                .is_none()
        };

        let reconcile_state = Arc::clone(&state);
        let reconcile = move |outcome: CabResult<Fetched<Ride>>| {
            reconcile_state.apply(outcome);
        };

        let handle = self.polls.start(
            PollKey::new("user", PollResource::CurrentRide),
            self.config.current_ride_interval,
            FailureMode::Surface,
            fetcher,
            enabled,
            reconcile,
        )?;

        Ok(CurrentRideWatch {
            api: Arc::clone(&self.api),
            actions: Arc::clone(&self.actions),
            navigator: Arc::clone(&self.navigator),
            polls: Arc::clone(&self.polls),
            handle,
            state,
        })
    }

    /// One ride by id, for the detail view.
    pub async fn ride_by_id(&self, ride_id: i64) -> CabResult<Fetched<Ride>> {
        self.gate.call(self.api.ride_by_id(ride_id)).await
    }

    /// Past rides, newest-first ordering left to the server; duplicates
    /// collapse by ride id.
    pub async fn ride_history(&self) -> CabResult<Vec<Ride>> {
        match self.gate.call(self.api.ride_history()).await? {
            Fetched::Present(rides) => Ok(models::ride::dedup_by_ride_id(rides)),
            Fetched::Absent => Ok(Vec::new()),
        }
    }
}

struct WatchState {
    machine: Mutex<RideStateMachine>,
    subflow: Mutex<Option<PostRideFlow>>,
    latest: Mutex<Option<Ride>>,
    last_error: Mutex<Option<String>>,
}

impl WatchState {
    fn apply(&self, outcome: CabResult<Fetched<Ride>>) {
        match outcome {
            Ok(snapshot) => {
                *self.latest.lock().expect("latest ride lock poisoned") =
                    snapshot.present().cloned();
                *self.last_error.lock().expect("error lock poisoned") = None;

                let transition = self
                    .machine
                    .lock()
                    .expect("watch machine lock poisoned")
                    .observe(&snapshot);
                if let Some(transition) = transition {
                    if transition.to == RideState::Completed {
                        let mut subflow = self.subflow.lock().expect("subflow lock poisoned");
                        if subflow.is_none() {
                            tracing::info!("Ride completed, opening payment step");
                            *subflow = Some(PostRideFlow::open());
                        }
                    }
                }
            }
            Err(err) => {
                *self.last_error.lock().expect("error lock poisoned") = render_error(&err);
            }
        }
    }
}

/// User-visible message for a failed current-ride fetch, or None for the
/// outcomes that must stay silent.
pub(crate) fn render_error(err: &CabError) -> Option<String> {
    match err {
        // The gate already cleared the session and redirected.
        CabError::Unauthorized(_) => None,
        err if err.is_transient() => Some("Connection problem. Retrying...".to_string()),
        _ => Some("Failed to load ride details.".to_string()),
    }
}

/// A running current-ride watch. Owns the poll handle and drives the
/// Payment -> Rating -> Done sub-flow once the ride completes.
pub struct CurrentRideWatch {
    api: Arc<dyn RideApi>,
    actions: Arc<ActionCoordinator>,
    navigator: Arc<dyn Navigator>,
    polls: Arc<PollingSession>,
    handle: PollHandle,
    state: Arc<WatchState>,
}

impl CurrentRideWatch {
    pub fn current_state(&self) -> RideState {
        self.state
            .machine
            .lock()
            .expect("watch machine lock poisoned")
            .current()
    }

    pub fn latest_ride(&self) -> Option<Ride> {
        self.state
            .latest
            .lock()
            .expect("latest ride lock poisoned")
            .clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state
            .last_error
            .lock()
            .expect("error lock poisoned")
            .clone()
    }

    pub fn subflow_step(&self) -> Option<FlowStep> {
        self.state
            .subflow
            .lock()
            .expect("subflow lock poisoned")
            .as_ref()
            .map(|flow| flow.step())
    }

    pub fn is_polling(&self) -> bool {
        self.handle.is_active()
    }

    /// Pay the completed ride's fare. Only reachable while the sub-flow sits
    /// at the payment step; advances it to rating on success.
    pub async fn pay(&self, method: PaymentMethod) -> CabResult<ActionOutcome<PaymentReceipt>> {
        if self.subflow_step() != Some(FlowStep::Payment) {
            return Err(CabError::validation_error("payment", "No payment is due"));
        }
        let ride = self
            .latest_ride()
            .ok_or_else(|| CabError::validation_error("payment", "No ride to pay for"))?;
        let request = PaymentRequest {
            ride_id: ride.ride_id,
            amount: ride.fare,
            method,
        };

        let outcome = self
            .actions
            .run(ActionKind::Pay, None, self.api.pay(&request))
            .await?;
        if let ActionOutcome::Completed(_) = &outcome {
            self.advance(|flow| flow.payment_succeeded())?;
        }
        Ok(outcome)
    }

    /// Rate the driver. Only reachable from the rating step; returns to the
    /// dashboard on success.
    pub async fn submit_rating(
        &self,
        rating: u8,
        review: Option<String>,
    ) -> CabResult<ActionOutcome<()>> {
        if self.subflow_step() != Some(FlowStep::Rating) {
            return Err(CabError::validation_error("rating", "No rating is due"));
        }
        let ride = self
            .latest_ride()
            .ok_or_else(|| CabError::validation_error("rating", "No ride to rate"))?;
        let driver_id = ride
            .driver
            .as_ref()
            .map(|driver| driver.id)
            .ok_or_else(|| CabError::validation_error("rating", "Ride has no driver to rate"))?;
        let request = RatingRequest {
            ride_id: ride.ride_id,
            driver_id,
            rating,
            review,
        };
        request.validate()?;

        let outcome = self
            .actions
            .run(ActionKind::Rate, None, self.api.submit_rating(&request))
            .await?;
        if let ActionOutcome::Completed(()) = &outcome {
            self.advance(|flow| flow.rating_submitted())?;
            self.finish();
        }
        Ok(outcome)
    }

    /// Skip the rating step and return to the dashboard. No server call.
    pub fn skip_rating(&self) -> CabResult<()> {
        if self.subflow_step() != Some(FlowStep::Rating) {
            return Err(CabError::validation_error("rating", "No rating to skip"));
        }
        self.advance(|flow| flow.rating_skipped())?;
        self.finish();
        Ok(())
    }

    /// Tear the watch down without going through the sub-flow (view
    /// unmount, navigation away).
    pub fn stop(&self) {
        self.polls.stop(&self.handle);
    }

    fn advance(
        &self,
        step: impl FnOnce(&mut PostRideFlow) -> Result<FlowStep, crate::services::state_machine::FlowError>,
    ) -> CabResult<()> {
        let mut subflow = self.state.subflow.lock().expect("subflow lock poisoned");
        let flow = subflow
            .as_mut()
            .ok_or_else(|| CabError::validation_error("flow", "No post-ride flow is open"))?;
        step(flow).map_err(|err| CabError::validation_error("flow", err.to_string()))?;
        Ok(())
    }

    fn finish(&self) {
        tracing::info!("Post-ride flow finished, returning to dashboard");
        self.polls.stop(&self.handle);
        self.navigator.navigate(Route::UserDashboard);
    }
}
