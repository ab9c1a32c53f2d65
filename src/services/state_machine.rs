// src/services/state_machine.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Ride, RideStatus};
use crate::services::session_gate::Fetched;

/// Logical ride state as the client sees it. Derived directly from the
/// latest snapshot: the fetched status when a ride exists, `NoRide` when the
/// resource is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideState {
    NoRide,
    Requested,
    Accepted,
    InProgress,
    Completed,
}

impl RideState {
    pub fn from_snapshot(snapshot: &Fetched<Ride>) -> Self {
        match snapshot {
            Fetched::Absent => RideState::NoRide,
            Fetched::Present(ride) => ride.status.into(),
        }
    }
}

impl From<RideStatus> for RideState {
    fn from(status: RideStatus) -> Self {
        match status {
            RideStatus::Requested => RideState::Requested,
            RideStatus::Accepted => RideState::Accepted,
            RideStatus::InProgress => RideState::InProgress,
            RideStatus::Completed => RideState::Completed,
        }
    }
}

/// A detected change in the derived ride state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RideTransition {
    pub from: RideState,
    pub to: RideState,
}

/// Memoizes the previously derived state so side effects fire on change
/// only, not on every poll tick returning the same status.
#[derive(Debug)]
pub struct RideStateMachine {
    current: RideState,
}

impl Default for RideStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RideStateMachine {
    pub fn new() -> Self {
        Self {
            current: RideState::NoRide,
        }
    }

    pub fn current(&self) -> RideState {
        self.current
    }

    /// Feed the latest snapshot; returns a transition event only when the
    /// derived state differs from the stored one.
    pub fn observe(&mut self, snapshot: &Fetched<Ride>) -> Option<RideTransition> {
        let next = RideState::from_snapshot(snapshot);
        if next == self.current {
            return None;
        }
        let transition = RideTransition {
            from: self.current,
            to: next,
        };
        self.current = next;
        tracing::info!("Ride state {:?} -> {:?}", transition.from, transition.to);
        Some(transition)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("step {attempted:?} is not reachable from {current:?}")]
    OutOfOrder {
        current: FlowStep,
        attempted: FlowStep,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    Payment,
    Rating,
    Done,
}

/// The post-ride sub-flow: Payment, then Rating, then back to the
/// dashboard. Strictly sequential; each step is reachable only from its
/// predecessor; rating may be skipped, payment may not.
///
/// While a sub-flow is open the ride poll is suspended, so a ride that
/// disappears server-side mid-payment cannot yank the flow out from under
/// the user.
#[derive(Debug)]
pub struct PostRideFlow {
    step: FlowStep,
}

impl PostRideFlow {
    /// Open the sub-flow at the payment step.
    pub fn open() -> Self {
        Self {
            step: FlowStep::Payment,
        }
    }

    pub fn step(&self) -> FlowStep {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.step == FlowStep::Done
    }

    pub fn payment_succeeded(&mut self) -> Result<FlowStep, FlowError> {
        self.advance(FlowStep::Payment, FlowStep::Rating)
    }

    pub fn rating_submitted(&mut self) -> Result<FlowStep, FlowError> {
        self.advance(FlowStep::Rating, FlowStep::Done)
    }

    /// Rating is the only skippable step.
    pub fn rating_skipped(&mut self) -> Result<FlowStep, FlowError> {
        self.advance(FlowStep::Rating, FlowStep::Done)
    }

    fn advance(&mut self, expected: FlowStep, next: FlowStep) -> Result<FlowStep, FlowError> {
        if self.step != expected {
            return Err(FlowError::OutOfOrder {
                current: self.step,
                attempted: next,
            });
        }
        self.step = next;
        Ok(next)
    }
}
