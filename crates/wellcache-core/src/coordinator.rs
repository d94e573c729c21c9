//! The data coordinator: decides whether the app shows live, cached or bundled
//! directory data, and keeps the offline cache current.
//!
//! Every failure path ends in `Phase::Ready` with some payload. Stale or
//! bundled content is always preferred over showing nothing, so errors are
//! logged and recorded in state but never returned.
//!
//! Lifecycle:
//! - `initialize` once at startup: fresh cache, else bundled data.
//! - `refresh` on demand: probe, fetch, write through on success; on failure
//!   fall back to the cache regardless of age, then to what is already shown,
//!   then to bundled data.
//! - Concurrent `refresh` calls coalesce onto the one in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, KeyValueStore};
use crate::connectivity::{ConnectivityProbe, ConnectivitySnapshot, Subscription};
use crate::defaults::static_directory;
use crate::error::FailureKind;
use crate::freshness::{age_display, FreshnessPolicy};
use crate::models::{DataSource, DirectoryPayload};
use crate::remote::{RemoteError, RemoteSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Loading,
    Ready,
    Refreshing,
}

/// Everything a front end needs to render. Cheap to clone; the payload is
/// shared.
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    pub phase: Phase,
    pub current: Arc<DirectoryPayload>,
    pub source: DataSource,
    pub loading: bool,
    pub online: bool,
    pub last_successful_write: Option<DateTime<Utc>>,
    pub last_failure: Option<FailureKind>,
}

impl CoordinatorState {
    fn new(current: Arc<DirectoryPayload>) -> Self {
        Self {
            phase: Phase::Uninitialized,
            current,
            source: DataSource::Static,
            loading: false,
            online: true,
            last_successful_write: None,
            last_failure: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// Short non-blocking notice for the user, or `None` when showing live
    /// data while online.
    pub fn banner(&self, now: DateTime<Utc>) -> Option<String> {
        let prefix = if self.online { "" } else { "Offline. " };
        let updated = self
            .last_successful_write
            .map(|at| format!(" (updated {})", age_display(at, now)))
            .unwrap_or_default();

        match self.source {
            DataSource::Remote if self.online => None,
            DataSource::Remote => Some(format!("{}Showing data from this session{}", prefix, updated)),
            DataSource::Cache => Some(format!("{}Showing cached data{}", prefix, updated)),
            DataSource::Static => Some(format!("{}Showing default content", prefix)),
        }
    }
}

/// The payload a load or refresh settled on.
struct Hydration {
    current: Arc<DirectoryPayload>,
    source: DataSource,
    persisted_at: Option<DateTime<Utc>>,
}

/// Clears the in-flight flag when the operation ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the directory state for the whole process. Construct one at startup
/// and hand references to whatever renders it.
pub struct DataCoordinator<S, P: ?Sized, R> {
    cache: CacheStore<S>,
    probe: Arc<P>,
    remote: R,
    freshness: FreshnessPolicy,
    static_default: Arc<DirectoryPayload>,
    state: Arc<watch::Sender<CoordinatorState>>,
    in_flight: AtomicBool,
}

impl<S, P, R> DataCoordinator<S, P, R>
where
    S: KeyValueStore,
    P: ConnectivityProbe + ?Sized + 'static,
    R: RemoteSource,
{
    pub fn new(cache: CacheStore<S>, probe: Arc<P>, remote: R) -> Self {
        let static_default = static_directory();
        let (state, _) = watch::channel(CoordinatorState::new(Arc::clone(&static_default)));
        Self {
            cache,
            probe,
            remote,
            freshness: FreshnessPolicy::default(),
            static_default,
            state: Arc::new(state),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_freshness(mut self, freshness: FreshnessPolicy) -> Self {
        self.freshness = freshness;
        self
    }

    /// Replace the bundled fallback payload.
    pub fn with_static_default(mut self, payload: Arc<DirectoryPayload>) -> Self {
        self.state.send_modify(|s| {
            if s.source == DataSource::Static {
                s.current = Arc::clone(&payload);
            }
        });
        self.static_default = payload;
        self
    }

    pub fn cache(&self) -> &CacheStore<S> {
        &self.cache
    }

    pub fn probe(&self) -> &Arc<P> {
        &self.probe
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn freshness(&self) -> FreshnessPolicy {
        self.freshness
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    /// The payload to render. Never does I/O.
    pub fn get_current(&self) -> Arc<DirectoryPayload> {
        Arc::clone(&self.state.borrow().current)
    }

    pub fn state(&self) -> CoordinatorState {
        self.state.borrow().clone()
    }

    /// Watch state changes (loading, online, payload swaps).
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    /// Keep `online` current between refreshes by listening to the probe.
    /// Drop the returned subscription on teardown.
    pub fn track_connectivity(&self) -> Subscription {
        let state = Arc::clone(&self.state);
        self.probe.subscribe(Arc::new(move |snapshot: ConnectivitySnapshot| {
            state.send_if_modified(|s| {
                if s.online == snapshot.reachable {
                    return false;
                }
                s.online = snapshot.reachable;
                true
            });
        }))
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Load whatever is best available without fetching: the cache if it is
    /// fresh, otherwise the bundled directory. The coordinator is `Ready` as
    /// soon as the cache has been read; the first connectivity reading is
    /// recorded after that.
    pub async fn initialize(&self) {
        let Some(guard) = self.try_begin(Phase::Loading) else {
            debug!("Initialize skipped, another operation is in flight");
            return;
        };

        let mut failure = None;
        let entry = match self.cache.read().await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Cache unreadable at startup, using bundled data");
                failure = Some(e.kind());
                None
            }
        };

        let hydration = match entry {
            Some(entry) if self.freshness.is_fresh_now(entry.written_at) => {
                info!(
                    services = entry.payload.services.len(),
                    age = %age_display(entry.written_at, Utc::now()),
                    "Loaded directory from cache"
                );
                Hydration {
                    current: Arc::new(entry.payload),
                    source: DataSource::Cache,
                    persisted_at: Some(entry.written_at),
                }
            }
            Some(entry) => {
                info!(
                    age = %age_display(entry.written_at, Utc::now()),
                    "Cache is stale, using bundled data"
                );
                Hydration {
                    persisted_at: Some(entry.written_at),
                    ..self.static_hydration()
                }
            }
            None => {
                debug!("No cache, using bundled data");
                self.static_hydration()
            }
        };

        self.finish(guard, hydration, None, failure);

        // Data is already showing; a slow connectivity check only delays the online flag
        let snapshot = self.probe.snapshot().await;
        self.state.send_modify(|s| {
            s.online = snapshot.reachable;
            if s.last_failure.is_none() {
                s.last_failure = snapshot.failure();
            }
        });
    }

    /// Try to bring the directory up to date.
    ///
    /// Returns immediately if an initialize or refresh is already running.
    /// Never fails: the outcome is visible through `state()`.
    pub async fn refresh(&self) {
        let Some(guard) = self.try_begin(Phase::Refreshing) else {
            debug!("Refresh already in flight, coalescing");
            return;
        };

        let snapshot = self.probe.snapshot().await;
        let mut failure = snapshot.failure();

        let hydration = if !snapshot.reachable {
            info!("Offline, serving cached data");
            self.fallback(&mut failure).await
        } else {
            match self.fetch_remote().await {
                Ok(payload) => self.commit(payload, &mut failure).await,
                Err(e) => {
                    warn!(error = %e, "Remote fetch failed, falling back");
                    failure = Some(e.kind());
                    self.fallback(&mut failure).await
                }
            }
        };

        self.finish(guard, hydration, Some(snapshot.reachable), failure);
    }

    /// Drop the offline cache and return to bundled data, e.g. on logout.
    /// Returns false if another operation was in flight and nothing was done.
    pub async fn invalidate(&self) -> bool {
        let Some(guard) = self.try_begin(Phase::Loading) else {
            debug!("Invalidate skipped, another operation is in flight");
            return false;
        };

        let mut failure = None;
        let cleared = match self.cache.clear().await {
            Ok(()) => {
                info!("Offline cache cleared");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear offline cache");
                failure = Some(e.kind());
                false
            }
        };

        self.state.send_modify(|s| {
            if cleared {
                s.last_successful_write = None;
            }
        });
        self.finish(guard, self.static_hydration(), None, failure);
        true
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn try_begin(&self, phase: Phase) -> Option<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.state.send_modify(|s| {
            s.phase = phase;
            s.loading = true;
        });
        Some(FlightGuard(&self.in_flight))
    }

    fn finish(
        &self,
        guard: FlightGuard<'_>,
        hydration: Hydration,
        online: Option<bool>,
        failure: Option<FailureKind>,
    ) {
        self.state.send_modify(|s| {
            s.phase = Phase::Ready;
            s.loading = false;
            s.current = hydration.current;
            s.source = hydration.source;
            if let Some(at) = hydration.persisted_at {
                s.last_successful_write = Some(s.last_successful_write.map_or(at, |prev| prev.max(at)));
            }
            if let Some(online) = online {
                s.online = online;
            }
            s.last_failure = failure;
        });
        drop(guard);
    }

    fn static_hydration(&self) -> Hydration {
        Hydration {
            current: Arc::clone(&self.static_default),
            source: DataSource::Static,
            persisted_at: None,
        }
    }

    /// Fetch and check the remote payload. An empty directory is never an
    /// improvement over real cached content, so it counts as a failure.
    async fn fetch_remote(&self) -> Result<DirectoryPayload, RemoteError> {
        let payload = self.remote.fetch().await?;
        payload
            .validate()
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        if payload.is_empty() {
            return Err(RemoteError::EmptyResult);
        }
        Ok(payload)
    }

    async fn commit(&self, payload: DirectoryPayload, failure: &mut Option<FailureKind>) -> Hydration {
        let payload = Arc::new(payload);
        let persisted_at = match self.cache.write(&payload).await {
            Ok(written_at) => {
                info!(services = payload.services.len(), "Directory refreshed from backend");
                Some(written_at)
            }
            Err(e) => {
                // Still show what we fetched; it just won't survive a restart
                warn!(error = %e, "Fetched directory but could not cache it");
                *failure = Some(e.kind());
                None
            }
        };
        Hydration {
            current: payload,
            source: DataSource::Remote,
            persisted_at,
        }
    }

    /// Best data available without the backend: the cache whatever its age,
    /// then live data already shown this session, then the bundled directory.
    async fn fallback(&self, failure: &mut Option<FailureKind>) -> Hydration {
        match self.cache.read().await {
            Ok(Some(entry)) => {
                return Hydration {
                    current: Arc::new(entry.payload),
                    source: DataSource::Cache,
                    persisted_at: Some(entry.written_at),
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Cache unreadable during fallback");
                *failure = Some(e.kind());
            }
        }

        let state = self.state.borrow();
        if state.source == DataSource::Remote {
            Hydration {
                current: Arc::clone(&state.current),
                source: DataSource::Remote,
                persisted_at: None,
            }
        } else {
            drop(state);
            self.static_hydration()
        }
    }
}
