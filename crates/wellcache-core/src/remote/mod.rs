//! Remote directory data.
//!
//! `RemoteSource` is the seam the coordinator fetches through.
//! `SupabaseClient` reads the live tables; `DisabledSource` stands in when no
//! backend is configured, so the app runs on cached and bundled data alone.

pub mod client;
pub mod error;

use std::sync::Arc;

use async_trait::async_trait;

pub use client::{SupabaseClient, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::RemoteError;

use crate::models::DirectoryPayload;

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch the complete directory. Implementations bound their own latency.
    async fn fetch(&self) -> Result<DirectoryPayload, RemoteError>;
}

#[async_trait]
impl<T: RemoteSource + ?Sized> RemoteSource for Arc<T> {
    async fn fetch(&self) -> Result<DirectoryPayload, RemoteError> {
        (**self).fetch().await
    }
}

/// Demo mode: every fetch fails with `RemoteError::NotConfigured`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSource;

#[async_trait]
impl RemoteSource for DisabledSource {
    async fn fetch(&self) -> Result<DirectoryPayload, RemoteError> {
        Err(RemoteError::NotConfigured)
    }
}
