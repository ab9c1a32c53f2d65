// src/services/driver_flow.rs
//
// Driver-side wiring: the availability toggle, the available-rides feed,
// accepting rides and driving the trip through its status updates.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tracing;

use crate::{
    errors::{CabError, CabResult},
    models::{self, DriverProfile, Ride, RideStatus},
    nav::{Navigator, Route},
    services::actions::{AcceptOutcome, ActionCoordinator, ActionKind, ActionOutcome},
    services::api_client::RideApi,
    services::polling::{FailureMode, PollHandle, PollKey, PollResource, PollingSession},
    services::session_gate::{Fetched, SessionGate},
    services::state_machine::{RideState, RideStateMachine},
    session::SessionManager,
};

#[derive(Debug, Clone)]
pub struct DriverFlowConfig {
    pub available_rides_interval: Duration,
    pub current_ride_interval: Duration,
}

impl Default for DriverFlowConfig {
    fn default() -> Self {
        Self {
            available_rides_interval: Duration::from_secs(10),
            current_ride_interval: Duration::from_secs(5),
        }
    }
}

/// Driver-side ride operations.
///
/// The online flag lives here as the in-process truth; the session cache
/// mirrors it durably so a restart comes back in the same mode. The
/// available-rides poll keeps running while offline but its enabled
/// predicate holds it silent, so going back online needs no re-subscribe.
pub struct DriverService {
    api: Arc<dyn RideApi>,
    gate: Arc<SessionGate>,
    polls: Arc<PollingSession>,
    actions: Arc<ActionCoordinator>,
    navigator: Arc<dyn Navigator>,
    session: Arc<SessionManager>,
    config: DriverFlowConfig,
    online: Arc<AtomicBool>,
    available: Arc<Mutex<Vec<Ride>>>,
    list_handle: Mutex<Option<PollHandle>>,
    ride_handle: Mutex<Option<PollHandle>>,
}

impl DriverService {
    pub fn new(
        api: Arc<dyn RideApi>,
        gate: Arc<SessionGate>,
        polls: Arc<PollingSession>,
        actions: Arc<ActionCoordinator>,
        navigator: Arc<dyn Navigator>,
        session: Arc<SessionManager>,
        config: DriverFlowConfig,
    ) -> Self {
        Self {
            api,
            gate,
            polls,
            actions,
            navigator,
            session,
            config,
            online: Arc::new(AtomicBool::new(false)),
            available: Arc::new(Mutex::new(Vec::new())),
            list_handle: Mutex::new(None),
            ride_handle: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Seed the online flag at session start from the resolved availability
    /// (durable override or server profile).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn available_rides(&self) -> Vec<Ride> {
        self.available
            .lock()
            .expect("available rides lock poisoned")
            .clone()
    }

    /// Start the available-rides feed. Runs for the dashboard's lifetime;
    /// ticks are held while the driver is offline.
    pub fn start_available_rides_poll(&self) -> CabResult<PollHandle> {
        let api = Arc::clone(&self.api);
        let gate = Arc::clone(&self.gate);
        let fetcher = move || {
            let api = Arc::clone(&api);
            let gate = Arc::clone(&gate);
            async move { gate.call(api.available_rides()).await }.boxed()
        };

        let online = Arc::clone(&self.online);
        let enabled = move || online.load(Ordering::SeqCst);

        let available = Arc::clone(&self.available);
        let reconcile = move |outcome: CabResult<Fetched<Vec<Ride>>>| {
            let Ok(snapshot) = outcome else {
                return;
            };
            let rides = match snapshot {
                Fetched::Present(rides) => models::ride::dedup_by_ride_id(rides),
                Fetched::Absent => Vec::new(),
            };
            *available.lock().expect("available rides lock poisoned") = rides;
        };

        let handle = self.polls.start(
            PollKey::new("driver", PollResource::AvailableRides),
            self.config.available_rides_interval,
            FailureMode::Swallow,
            fetcher,
            enabled,
            reconcile,
        )?;
        *self.list_handle.lock().expect("list handle lock poisoned") = Some(handle.clone());
        Ok(handle)
    }

    /// Flip the online flag. The server confirms first; only then do the
    /// in-process flag and the durable cache change. Going offline empties
    /// the local list immediately rather than waiting for a tick that will
    /// never come.
    pub async fn toggle_availability(&self) -> CabResult<ActionOutcome<DriverProfile>> {
        let target = !self.is_online();

        let outcome = self
            .actions
            .run(
                ActionKind::ToggleAvailability,
                None,
                self.api.set_availability(target),
            )
            .await?;

        if let ActionOutcome::Completed(profile) = &outcome {
            self.online.store(profile.available, Ordering::SeqCst);
            self.session.set_cached_availability(profile.available)?;
            if profile.available {
                // Flag first, then wake the feed, so the tick is not held
                // by the offline predicate.
                if let Some(handle) = self.list_handle() {
                    handle.refresh_now();
                }
            } else {
                self.available
                    .lock()
                    .expect("available rides lock poisoned")
                    .clear();
            }
            tracing::info!(
                "Driver is now {}",
                if profile.available { "online" } else { "offline" }
            );
        }
        Ok(outcome)
    }

    /// Accept a ride from the list. Losing the race to another driver is a
    /// normal outcome: the list is refreshed once and the caller shows
    /// "no longer available". Winning navigates to the ride view.
    pub async fn accept_ride(&self, ride_id: i64) -> CabResult<AcceptOutcome> {
        let list_handle = self
            .list_handle()
            .ok_or_else(|| CabError::validation_error("rides", "Ride list is not being watched"))?;

        let outcome = self
            .actions
            .accept_ride(self.api.accept_ride(ride_id), &list_handle)
            .await?;
        if let AcceptOutcome::Accepted(ride) = &outcome {
            tracing::info!("Accepted ride {}", ride.ride_id);
            self.navigator.navigate(Route::RideDetail);
        }
        Ok(outcome)
    }

    /// Start watching the driver's active ride. Failed fetches surface as a
    /// user-visible message, like the rider-side watch.
    pub fn start_current_ride_watch(&self) -> CabResult<DriverRideWatch> {
        let machine = Arc::new(Mutex::new(RideStateMachine::new()));
        let latest: Arc<Mutex<Option<Ride>>> = Arc::new(Mutex::new(None));
        let last_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let api = Arc::clone(&self.api);
        let gate = Arc::clone(&self.gate);
        let fetcher = move || {
            let api = Arc::clone(&api);
            let gate = Arc::clone(&gate);
            async move { gate.call(api.driver_current_ride()).await }.boxed()
        };

        let reconcile_machine = Arc::clone(&machine);
        let reconcile_latest = Arc::clone(&latest);
        let reconcile_error = Arc::clone(&last_error);
        let reconcile = move |outcome: CabResult<Fetched<Ride>>| {
            match outcome {
                Ok(snapshot) => {
                    *reconcile_latest.lock().expect("latest ride lock poisoned") =
                        snapshot.present().cloned();
                    *reconcile_error.lock().expect("error lock poisoned") = None;
                    reconcile_machine
                        .lock()
                        .expect("ride machine lock poisoned")
                        .observe(&snapshot);
                }
                Err(err) => {
                    *reconcile_error.lock().expect("error lock poisoned") =
                        crate::services::ride_flow::render_error(&err);
                }
            }
        };

        let handle = self.polls.start(
            PollKey::new("driver", PollResource::CurrentRide),
            self.config.current_ride_interval,
            FailureMode::Surface,
            fetcher,
            enabled_always,
            reconcile,
        )?;
        *self.ride_handle.lock().expect("ride handle lock poisoned") = Some(handle.clone());

        Ok(DriverRideWatch {
            handle,
            machine,
            latest,
            last_error,
        })
    }

    /// Move the active ride to IN_PROGRESS.
    pub async fn start_trip(&self) -> CabResult<ActionOutcome<Ride>> {
        self.update_status(RideStatus::InProgress).await
    }

    /// Move the active ride to COMPLETED and return to the dashboard.
    pub async fn complete_trip(&self) -> CabResult<ActionOutcome<Ride>> {
        let outcome = self.update_status(RideStatus::Completed).await?;
        if let ActionOutcome::Completed(_) = &outcome {
            if let Some(handle) = self
                .ride_handle
                .lock()
                .expect("ride handle lock poisoned")
                .take()
            {
                self.polls.stop(&handle);
            }
            self.navigator.navigate(Route::DriverDashboard);
        }
        Ok(outcome)
    }

    /// Completed driver trips, deduplicated by ride id.
    pub async fn ride_history(&self) -> CabResult<Vec<Ride>> {
        match self.gate.call(self.api.driver_ride_history()).await? {
            Fetched::Present(rides) => Ok(models::ride::dedup_by_ride_id(rides)),
            Fetched::Absent => Ok(Vec::new()),
        }
    }

    /// Tear down the driver dashboard's polls (view unmount).
    pub fn stop(&self) {
        for slot in [&self.list_handle, &self.ride_handle] {
            if let Some(handle) = slot.lock().expect("handle lock poisoned").take() {
                self.polls.stop(&handle);
            }
        }
    }

    async fn update_status(&self, status: RideStatus) -> CabResult<ActionOutcome<Ride>> {
        let ride_handle = self.ride_handle();
        self.actions
            .run(
                ActionKind::UpdateRideStatus,
                ride_handle.as_ref(),
                self.api.update_ride_status(status),
            )
            .await
    }

    fn list_handle(&self) -> Option<PollHandle> {
        self.list_handle
            .lock()
            .expect("list handle lock poisoned")
            .clone()
    }

    fn ride_handle(&self) -> Option<PollHandle> {
        self.ride_handle
            .lock()
            .expect("ride handle lock poisoned")
            .clone()
    }
}

fn enabled_always() -> bool {
    true
}

/// A running driver-side ride watch.
pub struct DriverRideWatch {
    handle: PollHandle,
    machine: Arc<Mutex<RideStateMachine>>,
    latest: Arc<Mutex<Option<Ride>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl DriverRideWatch {
    pub fn current_state(&self) -> RideState {
        self.machine
            .lock()
            .expect("ride machine lock poisoned")
            .current()
    }

    pub fn latest_ride(&self) -> Option<Ride> {
        self.latest.lock().expect("latest ride lock poisoned").clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("error lock poisoned").clone()
    }

    pub fn is_polling(&self) -> bool {
        self.handle.is_active()
    }
}
