//! Observable per-fingerprint query state.
//!
//! Every fingerprint gets one [`QueryState`], created lazily by the
//! [`QueryRegistry`]. Status moves `idle → loading → success | error`; a new
//! `loading` cycle may start from any status, `success` and `error` are only
//! reachable from `loading`, and `idle` only through [`QueryState::reset`].
//!
//! Subscribers are called synchronously, in subscription order, outside the
//! state lock. A panicking subscriber is logged and skipped.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tether_core::ErrorInfo;
use tracing::{debug, error};

use crate::errors::QueryError;
use crate::fingerprint::QueryFingerprint;

/// Lifecycle status of a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryStatus {
    /// Never run, or reset.
    #[default]
    Idle,
    /// A request is in flight.
    Loading,
    /// The last request succeeded.
    Success,
    /// The last request failed.
    Error,
}

/// Point-in-time view handed to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySnapshot {
    /// Query identity.
    pub fingerprint: String,
    /// Current status.
    pub status: QueryStatus,
    /// Latest payload, kept across later loading and error cycles.
    pub payload: Option<Value>,
    /// Latest error.
    pub error: Option<ErrorInfo>,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    /// Epoch ms of the last payload update.
    pub last_updated: Option<i64>,
    /// Loading with no payload yet.
    pub is_loading: bool,
    /// Loading, with or without a payload.
    pub is_fetching: bool,
    /// Status is `error`.
    pub is_error: bool,
    /// Status is `success`.
    pub is_success: bool,
}

type Subscriber = Arc<dyn Fn(&QuerySnapshot) + Send + Sync>;

#[derive(Debug, Default)]
struct Inner {
    status: QueryStatus,
    payload: Option<Value>,
    error: Option<ErrorInfo>,
    failure_count: u32,
    last_updated: Option<i64>,
}

/// State of one query plus its subscribers.
pub struct QueryState {
    fingerprint: QueryFingerprint,
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_subscriber_id: AtomicU64,
}

impl std::fmt::Debug for QueryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryState")
            .field("fingerprint", &self.fingerprint)
            .field("inner", &*self.inner.lock())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl QueryState {
    /// Create an idle state.
    pub fn new(fingerprint: QueryFingerprint) -> Self {
        Self {
            fingerprint,
            inner: Mutex::new(Inner::default()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Query identity.
    pub fn fingerprint(&self) -> &QueryFingerprint {
        &self.fingerprint
    }

    /// Current status.
    pub fn status(&self) -> QueryStatus {
        self.inner.lock().status
    }

    /// Current view.
    pub fn snapshot(&self) -> QuerySnapshot {
        Self::snapshot_of(&self.fingerprint, &self.inner.lock())
    }

    fn snapshot_of(fingerprint: &QueryFingerprint, inner: &Inner) -> QuerySnapshot {
        let loading = inner.status == QueryStatus::Loading;
        QuerySnapshot {
            fingerprint: fingerprint.to_string(),
            status: inner.status,
            payload: inner.payload.clone(),
            error: inner.error.clone(),
            failure_count: inner.failure_count,
            last_updated: inner.last_updated,
            is_loading: loading && inner.payload.is_none(),
            is_fetching: loading,
            is_error: inner.status == QueryStatus::Error,
            is_success: inner.status == QueryStatus::Success,
        }
    }

    /// Move to `status`, record `payload`/`error` and notify subscribers.
    ///
    /// `last_updated` changes only when a payload is given. Entering `error`
    /// bumps `failure_count`; entering `success` clears it and the error.
    pub(crate) fn update_status(
        &self,
        status: QueryStatus,
        payload: Option<Value>,
        error: Option<ErrorInfo>,
    ) -> Result<QuerySnapshot, QueryError> {
        let snapshot = {
            let mut inner = self.inner.lock();
            let from = inner.status;
            let allowed = match status {
                QueryStatus::Loading => true,
                QueryStatus::Success | QueryStatus::Error => from == QueryStatus::Loading,
                QueryStatus::Idle => false,
            };
            if !allowed {
                return Err(QueryError::InvalidTransition { from, to: status });
            }

            inner.status = status;
            if let Some(payload) = payload {
                inner.payload = Some(payload);
                inner.last_updated = Some(tether_core::now_ms());
            }
            match status {
                QueryStatus::Success => {
                    inner.error = None;
                    inner.failure_count = 0;
                }
                QueryStatus::Error => {
                    inner.error = error;
                    inner.failure_count = inner.failure_count.saturating_add(1);
                }
                QueryStatus::Loading | QueryStatus::Idle => {}
            }

            debug!(fingerprint = %self.fingerprint, ?from, to = ?status, "query status");
            Self::snapshot_of(&self.fingerprint, &inner)
        };

        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// Return to `idle`, dropping payload, error and counters.
    pub fn reset(&self) -> QuerySnapshot {
        let snapshot = {
            let mut inner = self.inner.lock();
            *inner = Inner::default();
            Self::snapshot_of(&self.fingerprint, &inner)
        };
        self.notify(&snapshot);
        snapshot
    }

    /// Register `callback`; it runs on every status update.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&QuerySnapshot) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            state: Arc::downgrade(self),
            active: AtomicBool::new(true),
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|(sid, _)| *sid != id);
    }

    fn notify(&self, snapshot: &QuerySnapshot) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in subscribers {
            if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                error!(fingerprint = %self.fingerprint, "query subscriber panicked");
            }
        }
    }
}

/// Handle returned by [`QueryState::subscribe`].
///
/// Dropping the handle keeps the subscription; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    state: Weak<QueryState>,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the callback. Later calls do nothing.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(state) = self.state.upgrade() {
                state.unsubscribe(self.id);
            }
        }
    }

    /// Whether the callback is still registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.state.strong_count() > 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Fingerprint → [`QueryState`] map.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    states: Mutex<HashMap<QueryFingerprint, Arc<QueryState>>>,
}

impl QueryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state for `fingerprint`, created idle if missing.
    pub fn get_or_create(&self, fingerprint: &QueryFingerprint) -> Arc<QueryState> {
        Arc::clone(
            self.states
                .lock()
                .entry(fingerprint.clone())
                .or_insert_with(|| Arc::new(QueryState::new(fingerprint.clone()))),
        )
    }

    /// The state for `fingerprint`, if one exists.
    pub fn get(&self, fingerprint: &QueryFingerprint) -> Option<Arc<QueryState>> {
        self.states.lock().get(fingerprint).cloned()
    }

    /// Drop the state for `fingerprint`.
    pub fn remove(&self, fingerprint: &QueryFingerprint) -> Option<Arc<QueryState>> {
        self.states.lock().remove(fingerprint)
    }

    /// Drop every state.
    pub fn clear(&self) {
        self.states.lock().clear();
    }

    /// Every tracked fingerprint, sorted.
    pub fn fingerprints(&self) -> Vec<QueryFingerprint> {
        let mut all: Vec<QueryFingerprint> = self.states.lock().keys().cloned().collect();
        all.sort();
        all
    }

    /// Number of tracked queries.
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    /// Whether no queries are tracked.
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
