use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, warn};

use super::{CacheError, KeyValueStore};
use crate::models::DirectoryPayload;

/// Storage key holding the serialized payload.
pub const PAYLOAD_KEY: &str = "offline_data";

/// Storage key holding the epoch-millisecond write time. Written last so it
/// acts as the commit marker for the payload.
pub const TIMESTAMP_KEY: &str = "cache_timestamp";

/// A payload read back from storage together with when it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: DirectoryPayload,
    pub written_at: DateTime<Utc>,
}

/// Persists exactly one `DirectoryPayload` and its write time.
#[derive(Debug)]
pub struct CacheStore<S> {
    storage: S,
}

impl<S: KeyValueStore> CacheStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Persist `payload` and stamp it with the current time.
    ///
    /// The payload is written before the timestamp; a crash in between leaves
    /// either no marker (reads as absent) or the previous marker next to a
    /// complete payload.
    pub async fn write(&self, payload: &DirectoryPayload) -> Result<DateTime<Utc>, CacheError> {
        let json = serde_json::to_string(payload)
            .map_err(|e| CacheError::Corrupt(format!("Failed to serialize payload: {}", e)))?;
        self.storage.set(PAYLOAD_KEY, &json).await?;

        let written_at = Utc::now().trunc_subsecs(3);
        self.storage
            .set(TIMESTAMP_KEY, &written_at.timestamp_millis().to_string())
            .await?;

        debug!(
            services = payload.services.len(),
            resources = payload.resources.len(),
            testimonials = payload.testimonials.len(),
            bytes = json.len(),
            "Cache written"
        );
        Ok(written_at)
    }

    /// Read the cached payload.
    ///
    /// Returns `Ok(None)` when either key is missing. Data that is present but
    /// fails to parse or validate is `CacheError::Corrupt`; partially parsed
    /// data is never returned.
    pub async fn read(&self) -> Result<Option<CacheEntry>, CacheError> {
        let Some(raw_timestamp) = self.storage.get(TIMESTAMP_KEY).await? else {
            return Ok(None);
        };
        let Some(raw_payload) = self.storage.get(PAYLOAD_KEY).await? else {
            return Ok(None);
        };

        let millis: i64 = raw_timestamp.trim().parse().map_err(|e| {
            CacheError::Corrupt(format!("Invalid cache timestamp {:?}: {}", raw_timestamp, e))
        })?;
        let written_at = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            CacheError::Corrupt(format!("Cache timestamp out of range: {}", millis))
        })?;

        let payload: DirectoryPayload = serde_json::from_str(&raw_payload)
            .map_err(|e| CacheError::Corrupt(format!("Failed to parse cached payload: {}", e)))?;
        payload
            .validate()
            .map_err(|e| CacheError::Corrupt(format!("Cached payload failed validation: {}", e)))?;

        Ok(Some(CacheEntry {
            payload,
            written_at,
        }))
    }

    /// Like `read`, but any error is logged and reported as absence.
    pub async fn read_or_absent(&self) -> Option<CacheEntry> {
        match self.read().await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "Cache unreadable, treating as absent");
                None
            }
        }
    }

    /// Remove the cached payload. Clearing an empty cache is not an error.
    pub async fn clear(&self) -> Result<(), CacheError> {
        // Marker first, so an interrupted clear still reads as absent
        self.storage.remove(TIMESTAMP_KEY).await?;
        self.storage.remove(PAYLOAD_KEY).await?;
        debug!("Cache cleared");
        Ok(())
    }
}
