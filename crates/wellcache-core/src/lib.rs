//! Offline-first data layer for the wellness services directory.
//!
//! Decides whether to show live data from the backend, a cached copy from the
//! last successful fetch, or the directory bundled with the app, and keeps the
//! cache current as connectivity allows. Front ends hold one
//! `DataCoordinator` and render whatever `get_current` returns.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod defaults;
pub mod error;
pub mod freshness;
pub mod models;
pub mod remote;

pub use cache::{CacheEntry, CacheError, CacheStore, FileStore, KeyValueStore, MemoryStore};
pub use config::Config;
pub use connectivity::{
    spawn_watcher, ConnectivityProbe, ConnectivitySnapshot, FixedProbe, HttpProbe, Reachability,
    Subscription, WatchHandle,
};
pub use coordinator::{CoordinatorState, DataCoordinator, Phase};
pub use defaults::static_directory;
pub use error::FailureKind;
pub use freshness::{age_display, is_fresh, FreshnessPolicy};
pub use models::{DataSource, DirectoryPayload, Resource, ResourceType, Service, Testimonial};
pub use remote::{DisabledSource, RemoteError, RemoteSource, SupabaseClient};
