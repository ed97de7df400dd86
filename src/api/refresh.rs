//! Single-flight coordination for session refreshes.
//!
//! A burst of requests that all fail with an expired access token must
//! produce one refresh call, not one per request. Each client owns a
//! [`RefreshGate`]; the first caller to reach it runs the refresh and every
//! caller that arrives while it is in flight waits for and shares that
//! outcome.
//!
//! Callers record [`RefreshGate::epoch`] before sending their request. If a
//! refresh settles between that moment and the caller reaching the gate,
//! the request was sent with the pre-refresh token and the settled outcome
//! applies to it too, so no second refresh is started.
//!
//! The gate never holds a token. A successful outcome only says the token
//! store was updated; callers read the token back from the store.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;

/// Why a refresh did not produce a new access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// The refresh route answered with a non-2xx status.
    Rejected(u16),
    /// The refresh route answered 2xx without a usable token.
    MalformedResponse,
    /// No response from the refresh route.
    Transport(String),
    /// The new token could not be persisted.
    Storage(String),
    /// The session was ended by logout while the request was outstanding.
    SignedOut,
}

impl std::fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshFailure::Rejected(status) => write!(f, "refresh rejected ({})", status),
            RefreshFailure::MalformedResponse => write!(f, "refresh response had no access token"),
            RefreshFailure::Transport(e) => write!(f, "refresh request failed: {}", e),
            RefreshFailure::Storage(e) => write!(f, "could not store refreshed token: {}", e),
            RefreshFailure::SignedOut => write!(f, "session ended by logout"),
        }
    }
}

/// Result of one refresh. On success the new tokens are in the token store.
pub type RefreshOutcome = Result<(), RefreshFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    RefreshInFlight,
}

#[derive(Default)]
struct Settled {
    epoch: u64,
    outcome: Option<RefreshOutcome>,
}

impl Settled {
    fn publish(&mut self, outcome: RefreshOutcome, epoch: &AtomicU64) {
        self.epoch += 1;
        self.outcome = Some(outcome);
        epoch.store(self.epoch, Ordering::Release);
    }
}

/// Clears the in-flight flag even if the leader's future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
pub struct RefreshGate {
    slot: Mutex<Settled>,
    epoch: AtomicU64,
    in_flight: AtomicBool,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refreshes (and logins/logouts) that have settled so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RefreshState {
        if self.in_flight.load(Ordering::Acquire) {
            RefreshState::RefreshInFlight
        } else {
            RefreshState::Idle
        }
    }

    /// Run `refresh` unless a refresh has settled since `observed`, in which
    /// case that outcome is returned without calling `refresh`.
    ///
    /// Callers arriving while a refresh is in flight wait on the slot and
    /// then see the advanced epoch. If the leader is cancelled nothing is
    /// published and the next caller refreshes.
    pub async fn run<F, Fut>(&self, observed: u64, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome>,
    {
        let mut slot = self.slot.lock().await;

        if slot.epoch != observed {
            if let Some(outcome) = slot.outcome.as_ref() {
                log::debug!("Joining settled refresh (epoch {})", slot.epoch);
                return outcome.clone();
            }
        }

        let outcome = {
            let _in_flight = InFlight::enter(&self.in_flight);
            refresh().await
        };

        slot.publish(outcome.clone(), &self.epoch);
        outcome
    }

    /// Replace the session outside the refresh route, as login and logout
    /// do.
    ///
    /// Waits for any refresh in flight, runs `update` while holding the
    /// slot, then publishes `outcome` to every caller that observed an
    /// earlier epoch.
    pub async fn settle<R>(&self, outcome: RefreshOutcome, update: impl FnOnce() -> R) -> R {
        let mut slot = self.slot.lock().await;
        let result = update();
        slot.publish(outcome, &self.epoch);
        result
    }
}
