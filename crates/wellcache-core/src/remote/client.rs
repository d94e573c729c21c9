//! Client for the directory tables exposed over Supabase's PostgREST API.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{RemoteError, RemoteSource};
use crate::models::{DirectoryPayload, Resource, Service, Testimonial};

// ============================================================================
// Constants
// ============================================================================

/// PostgREST lives under this path on every Supabase project.
const REST_PATH: &str = "rest/v1";

/// Timeout in seconds for a whole directory fetch, rate-limit retries
/// included. Each request is bounded by the same value.
/// The coordinator never times out on its own, so every fetch is bounded here.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const SERVICES_QUERY: &str = "select=*&order=created_at.asc";
const RESOURCES_QUERY: &str = "select=*&order=created_at.desc";
const TESTIMONIALS_QUERY: &str = "select=*&order=created_at.desc";

/// Read-only client for the `services`, `resources` and `testimonials` tables.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(RemoteError::InvalidConfig(format!(
                "backend URL must be http(s): {:?}",
                base_url
            )));
        }
        let anon_key = anon_key.into();
        if anon_key.trim().is_empty() {
            return Err(RemoteError::InvalidConfig("anon key is empty".to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            anon_key,
            fetch_timeout: timeout,
        })
    }

    /// Bound the whole of `fetch` separately from each request.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        format!("{}/{}/{}?{}", self.base_url, REST_PATH, table, query)
    }

    fn headers(&self) -> Result<header::HeaderMap, RemoteError> {
        let invalid = |_| RemoteError::InvalidConfig("anon key is not a valid header value".to_string());

        let mut headers = header::HeaderMap::new();
        headers.insert("apikey", header::HeaderValue::from_str(&self.anon_key).map_err(invalid)?);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", self.anon_key)).map_err(invalid)?,
        );
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should
    /// retry), or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, RemoteError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
    }

    async fn get_rows<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Vec<T>, RemoteError> {
        let url = self.table_url(table, query);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.headers()?)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    let rows: Vec<T> = serde_json::from_str(&text).map_err(|e| {
                        RemoteError::InvalidResponse(format!("Failed to parse {} rows: {}", table, e))
                    })?;
                    debug!(table, rows = rows.len(), "Fetched table");
                    return Ok(rows);
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(RemoteError::RateLimited);
                    }
                    let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 4);
                    warn!(table, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms + jitter)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    // ===== Data Fetching Methods =====

    pub async fn fetch_services(&self) -> Result<Vec<Service>, RemoteError> {
        self.get_rows("services", SERVICES_QUERY).await
    }

    pub async fn fetch_resources(&self) -> Result<Vec<Resource>, RemoteError> {
        self.get_rows("resources", RESOURCES_QUERY).await
    }

    pub async fn fetch_testimonials(&self) -> Result<Vec<Testimonial>, RemoteError> {
        self.get_rows("testimonials", TESTIMONIALS_QUERY).await
    }

    /// Fetch all three tables concurrently. Any table failing fails the whole
    /// fetch, so a partial directory is never cached.
    async fn fetch_all(&self) -> Result<DirectoryPayload, RemoteError> {
        let (services, resources, testimonials) = futures::try_join!(
            self.fetch_services(),
            self.fetch_resources(),
            self.fetch_testimonials(),
        )?;

        let payload = DirectoryPayload::new(services, resources, testimonials);
        payload
            .validate()
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok(payload)
    }
}

#[async_trait]
impl RemoteSource for SupabaseClient {
    async fn fetch(&self) -> Result<DirectoryPayload, RemoteError> {
        tokio::time::timeout(self.fetch_timeout, self.fetch_all())
            .await
            .map_err(|_| {
                warn!(timeout = ?self.fetch_timeout, "Directory fetch timed out");
                RemoteError::TimedOut(self.fetch_timeout)
            })?
    }
}
