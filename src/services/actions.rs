// src/services/actions.rs
use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;

use tracing;

use crate::errors::{CabError, CabResult};
use crate::models::Ride;
use crate::services::polling::PollHandle;

/// User-triggered mutating actions. One instance of each kind may be in
/// flight at a time; re-entrant triggers (double clicks) are ignored while
/// the first is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    BookRide,
    AcceptRide,
    ToggleAvailability,
    UpdateRideStatus,
    Pay,
    Rate,
}

/// Result of attempting an action.
#[derive(Debug, PartialEq)]
pub enum ActionOutcome<T> {
    Completed(T),
    /// Another instance of the same action was already pending.
    Ignored,
}

impl<T> ActionOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            ActionOutcome::Completed(value) => Some(value),
            ActionOutcome::Ignored => None,
        }
    }
}

/// Outcome of the accept-ride action, which has a dedicated conflict case:
/// another driver may take the ride first, and that must read as "ride no
/// longer available", not as a generic failure.
#[derive(Debug, PartialEq)]
pub enum AcceptOutcome {
    Accepted(Ride),
    NoLongerAvailable,
    Ignored,
}

/// Serializes user-triggered mutations against the polling loops.
///
/// No optimistic state is kept anywhere in here: on success the caller gets
/// the server-confirmed payload and the relevant poll is refreshed out of
/// band; on failure the error is surfaced and nothing else changes.
pub struct ActionCoordinator {
    in_flight: Mutex<HashSet<ActionKind>>,
}

impl Default for ActionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionCoordinator {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Run a mutating call. Re-entrant invocations of the same kind return
    /// `Ignored` without touching the server. On success the given poll
    /// handle (if any) gets an immediate out-of-band refresh so the UI
    /// reconverges on server state right away.
    pub async fn run<T, F>(
        &self,
        kind: ActionKind,
        refresh: Option<&PollHandle>,
        invocation: F,
    ) -> CabResult<ActionOutcome<T>>
    where
        F: Future<Output = CabResult<T>>,
    {
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight, kind) else {
            tracing::debug!("Ignoring re-entrant {:?} while one is pending", kind);
            return Ok(ActionOutcome::Ignored);
        };

        match invocation.await {
            Ok(payload) => {
                tracing::info!("{:?} succeeded", kind);
                if let Some(handle) = refresh {
                    handle.refresh_now();
                }
                Ok(ActionOutcome::Completed(payload))
            }
            Err(err) => {
                tracing::warn!("{:?} failed: {}", kind, err);
                Err(err)
            }
        }
    }

    /// Accept a ride from the available list. A conflict (another driver got
    /// there first) maps to `NoLongerAvailable` and triggers exactly one
    /// refresh of the list poll so the stale entry disappears.
    pub async fn accept_ride<F>(
        &self,
        invocation: F,
        list_handle: &PollHandle,
    ) -> CabResult<AcceptOutcome>
    where
        F: Future<Output = CabResult<Ride>>,
    {
        match self.run(ActionKind::AcceptRide, None, invocation).await {
            Ok(ActionOutcome::Completed(ride)) => Ok(AcceptOutcome::Accepted(ride)),
            Ok(ActionOutcome::Ignored) => Ok(AcceptOutcome::Ignored),
            Err(CabError::Conflict(detail)) => {
                tracing::warn!("Ride no longer available: {}", detail);
                list_handle.refresh_now();
                Ok(AcceptOutcome::NoLongerAvailable)
            }
            Err(other) => Err(other),
        }
    }
}

/// Marks an action kind as in flight for the duration of its call, releasing
/// on drop so early returns and failures cannot leak the slot.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<ActionKind>>,
    kind: ActionKind,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(set: &'a Mutex<HashSet<ActionKind>>, kind: ActionKind) -> Option<Self> {
        let mut guard = set.lock().expect("action registry lock poisoned");
        if !guard.insert(kind) {
            return None;
        }
        Some(Self { set, kind })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("action registry lock poisoned")
            .remove(&self.kind);
    }
}
