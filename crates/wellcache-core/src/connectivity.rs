//! Network reachability: one-shot snapshots and change notifications.
//!
//! Probing is advisory. A probe that cannot tell, or whose query fails,
//! reports the network as reachable so a flaky check never locks the app
//! into offline mode.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::FailureKind;

/// HEAD probes give up after 5 seconds.
const PROBE_TIMEOUT_SECS: u64 = 5;

/// What the platform reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
    /// The platform could not say either way.
    Unknown,
}

impl Reachability {
    /// Unknown counts as reachable.
    pub fn is_reachable(self) -> bool {
        !matches!(self, Reachability::Unreachable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub reachable: bool,
    /// Set when `reachable` was assumed because the query failed or was
    /// inconclusive.
    pub assumed: bool,
}

impl ConnectivitySnapshot {
    pub fn online() -> Self {
        Self {
            reachable: true,
            assumed: false,
        }
    }

    pub fn offline() -> Self {
        Self {
            reachable: false,
            assumed: false,
        }
    }

    fn assumed_online() -> Self {
        Self {
            reachable: true,
            assumed: true,
        }
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.assumed.then_some(FailureKind::ConnectivityUnknown)
    }
}

impl From<Reachability> for ConnectivitySnapshot {
    fn from(reachability: Reachability) -> Self {
        match reachability {
            Reachability::Reachable => Self::online(),
            Reachability::Unreachable => Self::offline(),
            Reachability::Unknown => Self::assumed_online(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConnectivityError {
    #[error("Connectivity query failed: {0}")]
    Query(String),

    #[error("Connectivity request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Listener = Arc<dyn Fn(ConnectivitySnapshot) + Send + Sync>;

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Ask the platform once. Implementations may fail; callers should use
    /// `snapshot` instead.
    async fn query(&self) -> Result<Reachability, ConnectivityError>;

    fn listeners(&self) -> &ListenerRegistry;

    /// One-shot check that never fails. Transitions it observes are published
    /// to subscribers.
    async fn snapshot(&self) -> ConnectivitySnapshot {
        let snapshot = match self.query().await {
            Ok(reachability) => ConnectivitySnapshot::from(reachability),
            Err(e) => {
                warn!(error = %e, "Connectivity check failed, assuming online");
                ConnectivitySnapshot::assumed_online()
            }
        };
        self.listeners().publish(snapshot);
        snapshot
    }

    /// Register `on_change` for reachability transitions. The listener stays
    /// registered until the returned `Subscription` is dropped or unsubscribed.
    fn subscribe(&self, on_change: Listener) -> Subscription {
        self.listeners().subscribe(on_change)
    }
}

struct RegistryInner {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
    last_reachable: Mutex<bool>,
}

/// Callback list that fires only when reachability actually changes.
///
/// The baseline is "reachable", matching the optimistic default, so the first
/// offline observation counts as a transition.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
                last_reachable: Mutex::new(true),
            }),
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        Subscription {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record an observation and notify listeners if it is a transition.
    /// Returns whether listeners were notified.
    pub fn publish(&self, snapshot: ConnectivitySnapshot) -> bool {
        {
            let mut last = self
                .inner
                .last_reachable
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *last == snapshot.reachable {
                return false;
            }
            *last = snapshot.reachable;
        }

        info!(reachable = snapshot.reachable, "Connectivity changed");

        // Call outside the lock so a listener may unsubscribe itself
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
        true
    }
}

/// Handle for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Probes reachability with a HEAD request against a known URL.
///
/// Any HTTP response, whatever its status, proves the network works. A
/// connection failure means offline. Timeouts and other errors are
/// inconclusive.
pub struct HttpProbe {
    client: Client,
    url: String,
    listeners: ListenerRegistry,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Result<Self, ConnectivityError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            listeners: ListenerRegistry::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn query(&self) -> Result<Reachability, ConnectivityError> {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "Probe answered");
                Ok(Reachability::Reachable)
            }
            Err(e) if e.is_connect() => {
                debug!(url = %self.url, error = %e, "Probe could not connect");
                Ok(Reachability::Unreachable)
            }
            Err(e) if e.is_timeout() => Ok(Reachability::Unknown),
            Err(e) => Err(e.into()),
        }
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

const FIXED_REACHABLE: u8 = 0;
const FIXED_UNREACHABLE: u8 = 1;
const FIXED_UNKNOWN: u8 = 2;

/// A probe whose answer is set by hand: forced offline mode, or tests.
#[derive(Debug)]
pub struct FixedProbe {
    state: AtomicU8,
    failing: AtomicBool,
    queries: AtomicU64,
    listeners: ListenerRegistry,
}

impl FixedProbe {
    pub fn new(reachability: Reachability) -> Self {
        Self {
            state: AtomicU8::new(Self::encode(reachability)),
            failing: AtomicBool::new(false),
            queries: AtomicU64::new(0),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn online() -> Self {
        Self::new(Reachability::Reachable)
    }

    pub fn offline() -> Self {
        Self::new(Reachability::Unreachable)
    }

    fn encode(reachability: Reachability) -> u8 {
        match reachability {
            Reachability::Reachable => FIXED_REACHABLE,
            Reachability::Unreachable => FIXED_UNREACHABLE,
            Reachability::Unknown => FIXED_UNKNOWN,
        }
    }

    fn decode(value: u8) -> Reachability {
        match value {
            FIXED_REACHABLE => Reachability::Reachable,
            FIXED_UNREACHABLE => Reachability::Unreachable,
            _ => Reachability::Unknown,
        }
    }

    /// Change the answer and notify subscribers of the transition, if any.
    pub fn set(&self, reachability: Reachability) {
        self.state.store(Self::encode(reachability), Ordering::SeqCst);
        self.listeners.publish(reachability.into());
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.set(if reachable {
            Reachability::Reachable
        } else {
            Reachability::Unreachable
        });
    }

    /// Make every query fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for FixedProbe {
    async fn query(&self) -> Result<Reachability, ConnectivityError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConnectivityError::Query("simulated platform failure".to_string()));
        }
        Ok(Self::decode(self.state.load(Ordering::SeqCst)))
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

/// Background task polling a probe. Stops when dropped.
#[must_use = "dropping a WatchHandle stops the watcher"]
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn stop(self) {
        // Drop aborts the task
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll `probe` every `interval` so subscribers hear about transitions
/// between explicit checks. Must be called inside a tokio runtime.
pub fn spawn_watcher<P>(probe: Arc<P>, interval: Duration) -> WatchHandle
where
    P: ConnectivityProbe + ?Sized + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            probe.snapshot().await;
        }
    });
    WatchHandle { task }
}
