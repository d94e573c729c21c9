//! Application configuration management.
//!
//! Holds the backend endpoint, the connectivity probe target and the cache
//! freshness window. Stored at `~/.config/wellcache/config.json`; environment
//! variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::freshness::{FreshnessPolicy, DEFAULT_WINDOW_HOURS};
use crate::remote::DEFAULT_REQUEST_TIMEOUT_SECS;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "wellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_PROBE_URL: &str = "WELLCACHE_PROBE_URL";
pub const ENV_FRESHNESS_HOURS: &str = "WELLCACHE_FRESHNESS_HOURS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    /// URL hit with HEAD to decide whether we are online. Defaults to the
    /// backend URL when unset.
    pub probe_url: Option<String>,
    pub freshness_hours: u64,
    pub request_timeout_secs: u64,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            probe_url: None,
            freshness_hours: DEFAULT_WINDOW_HOURS as u64,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Load from the default location, or defaults if there is no file yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_SUPABASE_URL) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = non_empty(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = Some(key);
        }
        if let Some(url) = non_empty(ENV_PROBE_URL) {
            self.probe_url = Some(url);
        }
        if let Some(raw) = non_empty(ENV_FRESHNESS_HOURS) {
            match raw.trim().parse() {
                Ok(hours) => self.freshness_hours = hours,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_FRESHNESS_HOURS),
            }
        }
    }

    /// Backend URL and key, if both are set.
    pub fn backend(&self) -> Option<(&str, &str)> {
        match (&self.supabase_url, &self.supabase_anon_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }

    pub fn probe_target(&self) -> Option<&str> {
        self.probe_url.as_deref().or(self.supabase_url.as_deref())
    }

    pub fn freshness(&self) -> FreshnessPolicy {
        FreshnessPolicy::from_hours(self.freshness_hours)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
