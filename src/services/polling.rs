// src/services/polling.rs
//
// One recurring fetch-and-reconcile loop per (subject, resource) pair. The
// old pages each wired their own setInterval/clearInterval with slightly
// different teardown bugs; this owns scheduling, cancellation and the
// no-overlap rule in one place.
//
// Known limitation, kept on purpose: the interval is fixed, with no backoff
// on error streaks. That matches the behavior being consolidated.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing;

use crate::errors::{CabError, CabResult};
use crate::services::session_gate::Fetched;

/// Remote resources the client polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollResource {
    CurrentRide,
    AvailableRides,
    DriverSearch,
}

/// Identity of one poll: who is polling and for what. At most one live
/// handle exists per key; starting a second cancels the first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PollKey {
    pub subject: String,
    pub resource: PollResource,
}

impl PollKey {
    pub fn new(subject: impl Into<String>, resource: PollResource) -> Self {
        Self {
            subject: subject.into(),
            resource,
        }
    }
}

/// What the loop does with a failed fetch. Optional resources (the
/// available-rides feed) swallow transient failures and just wait for the
/// next tick; required resources surface every outcome to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Surface,
    Swallow,
}

pub type FetchFuture<T> = BoxFuture<'static, CabResult<Fetched<T>>>;

/// Cancellation and out-of-band refresh for one running poll.
#[derive(Clone)]
pub struct PollHandle {
    key: PollKey,
    active: Arc<AtomicBool>,
    refresh_tx: mpsc::Sender<()>,
}

impl PollHandle {
    pub fn key(&self) -> &PollKey {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Request a fetch outside the regular cadence, typically right after a
    /// mutating action. The request channel holds at most one pending
    /// refresh, so calling this again while a fetch is already in flight is
    /// a no-op rather than a second request.
    pub fn refresh_now(&self) {
        if !self.is_active() {
            return;
        }
        let _ = self.refresh_tx.try_send(());
    }

    /// Cancel future ticks. An in-flight fetch is allowed to complete but
    /// its result is discarded before reconciliation.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::debug!("Stopping poll {:?}", self.key);
            // Wake the loop if it is idle so the task exits promptly.
            let _ = self.refresh_tx.try_send(());
        }
    }
}

/// Registry of running polls, keyed so that no (subject, resource) pair ever
/// has two live timers.
pub struct PollingSession {
    polls: Mutex<HashMap<PollKey, PollHandle>>,
}

impl Default for PollingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingSession {
    pub fn new() -> Self {
        Self {
            polls: Mutex::new(HashMap::new()),
        }
    }

    /// Start a recurring poll. The first fetch is issued immediately, then
    /// at each interval boundary. Per tick: a false `enabled` predicate
    /// skips silently; an unresolved previous fetch skips the tick (no two
    /// fetches for one handle overlap); otherwise the fetch runs and its
    /// outcome goes to `reconcile`.
    ///
    /// The fetcher must be idempotent: it is invoked repeatedly and its
    /// result may be discarded after a stop.
    pub fn start<T, Fetch, Enabled, Reconcile>(
        &self,
        key: PollKey,
        interval: Duration,
        mode: FailureMode,
        fetcher: Fetch,
        enabled: Enabled,
        reconcile: Reconcile,
    ) -> CabResult<PollHandle>
    where
        T: Send + 'static,
        Fetch: Fn() -> FetchFuture<T> + Send + Sync + 'static,
        Enabled: Fn() -> bool + Send + Sync + 'static,
        Reconcile: Fn(CabResult<Fetched<T>>) + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(CabError::validation_error(
                "interval",
                "Poll interval must be greater than zero",
            ));
        }

        let (refresh_tx, mut refresh_rx) = mpsc::channel(1);
        let active = Arc::new(AtomicBool::new(true));
        let handle = PollHandle {
            key: key.clone(),
            active: Arc::clone(&active),
            refresh_tx,
        };

        {
            let mut polls = self.polls.lock().expect("poll registry lock poisoned");
            if let Some(previous) = polls.insert(key.clone(), handle.clone()) {
                tracing::debug!("Replacing live poll for {:?}", key);
                previous.stop();
            }
        }

        tracing::info!("Starting poll {:?} every {:?}", key, interval);
        let loop_key = key;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // A tick that lands while a fetch is still in flight is dropped,
            // not queued up.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    request = refresh_rx.recv() => {
                        if request.is_none() {
                            break;
                        }
                    }
                }
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                if !enabled() {
                    continue;
                }
                let outcome = fetcher().await;
                // Stopped while the fetch was in flight: the stale result
                // must not reach the reconciler.
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                // Same for a predicate that flipped false mid-flight.
                if !enabled() {
                    continue;
                }
                match outcome {
                    Err(err) if mode == FailureMode::Swallow => {
                        tracing::debug!(
                            "Poll {:?} fetch failed, retrying next tick: {}",
                            loop_key,
                            err
                        );
                    }
                    other => reconcile(other),
                }
            }
            tracing::debug!("Poll loop {:?} finished", loop_key);
        });

        Ok(handle)
    }

    /// Stop a poll and drop it from the registry, unless a newer handle has
    /// already taken over its key.
    pub fn stop(&self, handle: &PollHandle) {
        handle.stop();
        let mut polls = self.polls.lock().expect("poll registry lock poisoned");
        if let Some(current) = polls.get(handle.key()) {
            if Arc::ptr_eq(&current.active, &handle.active) {
                polls.remove(handle.key());
            }
        }
    }

    /// Tear down every running poll (view unmount, logout).
    pub fn stop_all(&self) {
        let mut polls = self.polls.lock().expect("poll registry lock poisoned");
        for handle in polls.values() {
            handle.stop();
        }
        polls.clear();
    }

    pub fn live_count(&self) -> usize {
        self.polls.lock().expect("poll registry lock poisoned").len()
    }
}
