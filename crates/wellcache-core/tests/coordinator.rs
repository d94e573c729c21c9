//! End-to-end behaviour of the data coordinator against in-memory storage,
//! a scripted probe and a scripted backend.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use wellcache_core::cache::{PAYLOAD_KEY, TIMESTAMP_KEY};
use wellcache_core::connectivity::{
    ConnectivityError, ConnectivityProbe, ListenerRegistry, Reachability,
};
use wellcache_core::{
    CacheStore, DataCoordinator, DataSource, DirectoryPayload, FailureKind, FixedProbe,
    FreshnessPolicy, KeyValueStore, MemoryStore, Phase, RemoteError, RemoteSource, Service,
};

// ===== Fixtures =====

fn service(id: i64, title: &str) -> Service {
    serde_json::from_value(json!({
        "id": id,
        "title": title,
        "category": "mental_wellness",
    }))
    .unwrap()
}

fn payload_with(count: i64, prefix: &str) -> DirectoryPayload {
    let services = (1..=count)
        .map(|id| service(id, &format!("{} {}", prefix, id)))
        .collect();
    DirectoryPayload::new(services, Vec::new(), Vec::new())
}

fn bundled() -> Arc<DirectoryPayload> {
    Arc::new(payload_with(2, "Bundled"))
}

/// Put `payload` into storage as if it had been written `age` ago.
async fn seed_cache(store: &MemoryStore, payload: &DirectoryPayload, age: chrono::Duration) {
    let written_at = Utc::now() - age;
    store
        .set(PAYLOAD_KEY, &serde_json::to_string(payload).unwrap())
        .await
        .unwrap();
    store
        .set(TIMESTAMP_KEY, &written_at.timestamp_millis().to_string())
        .await
        .unwrap();
}

enum Scripted {
    Payload(DirectoryPayload),
    Fail,
}

/// Backend stub that counts calls and can be slowed down.
struct ScriptedRemote {
    response: Mutex<Scripted>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedRemote {
    fn returning(payload: DirectoryPayload) -> Self {
        Self {
            response: Mutex::new(Scripted::Payload(payload)),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn failing() -> Self {
        Self {
            response: Mutex::new(Scripted::Fail),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn respond_with(&self, response: Scripted) {
        *self.response.lock().unwrap() = response;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn fetch(&self) -> Result<DirectoryPayload, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &*self.response.lock().unwrap() {
            Scripted::Payload(payload) => Ok(payload.clone()),
            Scripted::Fail => Err(RemoteError::ServerError("503: unavailable".to_string())),
        }
    }
}

/// Storage whose writes can be made to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        self.inner.remove(key).await
    }
}

/// Connectivity check that takes `delay` to report the network as down.
struct SlowProbe {
    delay: Duration,
    listeners: ListenerRegistry,
}

#[async_trait]
impl ConnectivityProbe for SlowProbe {
    async fn query(&self) -> Result<Reachability, ConnectivityError> {
        tokio::time::sleep(self.delay).await;
        Ok(Reachability::Unreachable)
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

type TestCoordinator<S> = DataCoordinator<Arc<S>, FixedProbe, Arc<ScriptedRemote>>;

fn coordinator<S: KeyValueStore>(
    store: &Arc<S>,
    probe: &Arc<FixedProbe>,
    remote: &Arc<ScriptedRemote>,
) -> TestCoordinator<S> {
    DataCoordinator::new(
        CacheStore::new(Arc::clone(store)),
        Arc::clone(probe),
        Arc::clone(remote),
    )
    .with_freshness(FreshnessPolicy::from_hours(24))
    .with_static_default(bundled())
}

// ===== Initialize =====

#[tokio::test]
async fn test_initialize_uses_fresh_cache() {
    let store = Arc::new(MemoryStore::new());
    seed_cache(&store, &payload_with(3, "Cached"), chrono::Duration::hours(1)).await;
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::failing());
    let coordinator = coordinator(&store, &probe, &remote);

    coordinator.initialize().await;

    let state = coordinator.state();
    assert_eq!(state.phase, Phase::Ready);
    assert!(!state.loading);
    assert_eq!(state.source, DataSource::Cache);
    assert_eq!(coordinator.get_current().services.len(), 3);
    assert!(state.last_successful_write.is_some());
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn test_initialize_prefers_bundled_over_stale_cache() {
    let store = Arc::new(MemoryStore::new());
    seed_cache(&store, &payload_with(3, "Cached"), chrono::Duration::hours(48)).await;
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::failing());
    let coordinator = coordinator(&store, &probe, &remote);

    coordinator.initialize().await;

    let state = coordinator.state();
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.source, DataSource::Static);
    assert_eq!(*coordinator.get_current(), *bundled());
}

#[tokio::test]
async fn test_initialize_survives_corrupt_cache() {
    let store = Arc::new(MemoryStore::new());
    store.set(PAYLOAD_KEY, "{ not json").await.unwrap();
    store
        .set(TIMESTAMP_KEY, &Utc::now().timestamp_millis().to_string())
        .await
        .unwrap();
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::failing());
    let coordinator = coordinator(&store, &probe, &remote);

    coordinator.initialize().await;

    let state = coordinator.state();
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.source, DataSource::Static);
    assert_eq!(state.last_failure, Some(FailureKind::CacheCorrupt));
}

#[tokio::test]
async fn test_initialize_records_connectivity() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(FixedProbe::offline());
    let remote = Arc::new(ScriptedRemote::failing());
    let coordinator = coordinator(&store, &probe, &remote);
    assert!(coordinator.state().online);

    coordinator.initialize().await;

    assert!(!coordinator.state().online);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_cache_shows_before_slow_connectivity_check() {
    let store = Arc::new(MemoryStore::new());
    seed_cache(&store, &payload_with(3, "Cached"), chrono::Duration::hours(1)).await;
    let probe = Arc::new(SlowProbe {
        delay: Duration::from_secs(5),
        listeners: ListenerRegistry::new(),
    });
    let remote = Arc::new(ScriptedRemote::failing());
    let coordinator = DataCoordinator::new(CacheStore::new(Arc::clone(&store)), probe, remote)
        .with_static_default(bundled());

    let init = coordinator.initialize();
    tokio::pin!(init);
    tokio::select! {
        _ = &mut init => panic!("initialize waited for the connectivity check"),
        _ = tokio::time::sleep(Duration::from_millis(4900)) => {}
    }

    let state = coordinator.state();
    assert_eq!(state.phase, Phase::Ready);
    assert!(!state.loading);
    assert_eq!(state.source, DataSource::Cache);
    assert_eq!(coordinator.get_current().services.len(), 3);

    init.await;
    assert!(!coordinator.state().online);
}

// ===== Refresh =====

#[tokio::test]
async fn test_refresh_online_writes_through() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::returning(payload_with(5, "Live")));
    let coordinator = coordinator(&store, &probe, &remote);
    coordinator.initialize().await;

    let before = Utc::now();
    coordinator.refresh().await;

    let state = coordinator.state();
    assert_eq!(state.source, DataSource::Remote);
    assert_eq!(state.last_failure, None);
    assert_eq!(coordinator.get_current().services.len(), 5);

    let entry = coordinator.cache().read().await.unwrap().unwrap();
    assert_eq!(entry.payload.services.len(), 5);
    assert!(entry.written_at >= before - chrono::Duration::milliseconds(1));
    assert_eq!(state.last_successful_write, Some(entry.written_at));
}

#[tokio::test]
async fn test_empty_remote_result_never_overwrites_cache() {
    let store = Arc::new(MemoryStore::new());
    let cached = payload_with(3, "Cached");
    seed_cache(&store, &cached, chrono::Duration::hours(1)).await;
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::returning(DirectoryPayload::default()));
    let coordinator = coordinator(&store, &probe, &remote);
    coordinator.initialize().await;
    let written_before = coordinator.state().last_successful_write;

    coordinator.refresh().await;

    let state = coordinator.state();
    assert_eq!(remote.calls(), 1);
    assert_eq!(*coordinator.get_current(), cached);
    assert_eq!(state.source, DataSource::Cache);
    assert_eq!(state.last_failure, Some(FailureKind::RemoteFetchFailed));
    assert_eq!(state.last_successful_write, written_before);

    let entry = coordinator.cache().read().await.unwrap().unwrap();
    assert_eq!(entry.payload, cached);
}

#[tokio::test]
async fn test_offline_refresh_never_calls_remote() {
    let store = Arc::new(MemoryStore::new());
    let cached = payload_with(3, "Cached");
    seed_cache(&store, &cached, chrono::Duration::hours(1)).await;
    let probe = Arc::new(FixedProbe::offline());
    let remote = Arc::new(ScriptedRemote::returning(payload_with(5, "Live")));
    let coordinator = coordinator(&store, &probe, &remote);
    coordinator.initialize().await;
    let raw_before = store.get(TIMESTAMP_KEY).await.unwrap();

    coordinator.refresh().await;

    let state = coordinator.state();
    assert_eq!(remote.calls(), 0);
    assert!(!state.online);
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.source, DataSource::Cache);
    assert_eq!(*coordinator.get_current(), cached);
    assert_eq!(store.get(TIMESTAMP_KEY).await.unwrap(), raw_before);
}

#[tokio::test]
async fn test_offline_refresh_without_cache_uses_bundled() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(FixedProbe::offline());
    let remote = Arc::new(ScriptedRemote::returning(payload_with(5, "Live")));
    let coordinator = coordinator(&store, &probe, &remote);

    coordinator.refresh().await;

    assert_eq!(remote.calls(), 0);
    assert_eq!(coordinator.state().source, DataSource::Static);
    assert_eq!(*coordinator.get_current(), *bundled());
}

#[tokio::test]
async fn test_concurrent_refreshes_fetch_once() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(
        ScriptedRemote::returning(payload_with(4, "Live")).with_delay(Duration::from_millis(50)),
    );
    let coordinator = coordinator(&store, &probe, &remote);

    tokio::join!(coordinator.refresh(), coordinator.refresh());

    assert_eq!(remote.calls(), 1);
    assert_eq!(coordinator.get_current().services.len(), 4);
    assert!(!coordinator.state().loading);

    coordinator.refresh().await;
    assert_eq!(remote.calls(), 2);
}

#[tokio::test]
async fn test_refresh_failure_prefers_stale_cache_over_bundled() {
    let store = Arc::new(MemoryStore::new());
    let cached = payload_with(3, "Cached");
    seed_cache(&store, &cached, chrono::Duration::hours(72)).await;
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::failing());
    let coordinator = coordinator(&store, &probe, &remote);
    coordinator.initialize().await;
    assert_eq!(coordinator.state().source, DataSource::Static);

    coordinator.refresh().await;

    assert_eq!(coordinator.state().source, DataSource::Cache);
    assert_eq!(*coordinator.get_current(), cached);
}

#[tokio::test]
async fn test_refresh_failure_keeps_live_data_when_cache_is_gone() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::returning(payload_with(5, "Live")));
    let coordinator = coordinator(&store, &probe, &remote);
    coordinator.refresh().await;
    coordinator.cache().clear().await.unwrap();

    remote.respond_with(Scripted::Fail);
    coordinator.refresh().await;

    let state = coordinator.state();
    assert_eq!(state.source, DataSource::Remote);
    assert_eq!(coordinator.get_current().services.len(), 5);
    assert_eq!(state.last_failure, Some(FailureKind::RemoteFetchFailed));
}

#[tokio::test]
async fn test_failed_cache_write_still_shows_fetched_data() {
    let store = Arc::new(FlakyStore::default());
    store.fail_writes.store(true, Ordering::SeqCst);
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::returning(payload_with(5, "Live")));
    let coordinator = coordinator(&store, &probe, &remote);

    coordinator.refresh().await;

    let state = coordinator.state();
    assert_eq!(state.source, DataSource::Remote);
    assert_eq!(coordinator.get_current().services.len(), 5);
    assert_eq!(state.last_failure, Some(FailureKind::CacheUnavailable));
    assert_eq!(state.last_successful_write, None);
}

#[tokio::test]
async fn test_failed_probe_is_treated_as_online() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(FixedProbe::offline());
    probe.set_failing(true);
    let remote = Arc::new(ScriptedRemote::returning(payload_with(2, "Live")));
    let coordinator = coordinator(&store, &probe, &remote);

    coordinator.refresh().await;

    let state = coordinator.state();
    assert_eq!(remote.calls(), 1);
    assert!(state.online);
    assert_eq!(state.source, DataSource::Remote);
    assert_eq!(state.last_failure, Some(FailureKind::ConnectivityUnknown));
}

// ===== Invalidate and observation =====

#[tokio::test]
async fn test_invalidate_returns_to_bundled() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::returning(payload_with(5, "Live")));
    let coordinator = coordinator(&store, &probe, &remote);
    coordinator.refresh().await;

    assert!(coordinator.invalidate().await);

    let state = coordinator.state();
    assert_eq!(state.source, DataSource::Static);
    assert_eq!(state.last_successful_write, None);
    assert!(coordinator.cache().read().await.unwrap().is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_subscribers_see_ready_after_refresh() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::returning(payload_with(1, "Live")));
    let coordinator = coordinator(&store, &probe, &remote);
    let mut rx = coordinator.subscribe();

    coordinator.refresh().await;

    assert!(rx.has_changed().unwrap());
    let state = rx.borrow_and_update().clone();
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.source, DataSource::Remote);
}

#[tokio::test]
async fn test_tracked_connectivity_updates_online_flag() {
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(FixedProbe::online());
    let remote = Arc::new(ScriptedRemote::failing());
    let coordinator = coordinator(&store, &probe, &remote);
    let subscription = coordinator.track_connectivity();

    probe.set(Reachability::Unreachable);
    assert!(!coordinator.state().online);

    probe.set(Reachability::Reachable);
    assert!(coordinator.state().online);

    drop(subscription);
    probe.set(Reachability::Unreachable);
    assert!(coordinator.state().online);
}
