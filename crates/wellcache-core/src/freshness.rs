//! Cache freshness decisions and cache age display.

use chrono::{DateTime, Duration, Utc};

/// Cached directory data is served for 24 hours before it counts as stale.
/// Directory content changes rarely; a day keeps offline launches useful.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Whether data written at `written_at` is still usable at `now`.
///
/// A timestamp in the future (clock skew) has its age clamped to zero, so it
/// counts as fresh rather than invalidating the cache.
pub fn is_fresh(written_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    let age = (now - written_at).max(Duration::zero());
    age < window
}

/// The configured freshness window, fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    window: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_WINDOW_HOURS))
    }
}

impl FreshnessPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_hours(hours: u64) -> Self {
        Self::new(Duration::hours(hours.min(i64::MAX as u64 / 3_600_000) as i64))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_fresh_at(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        is_fresh(written_at, now, self.window)
    }

    pub fn is_fresh_now(&self, written_at: DateTime<Utc>) -> bool {
        self.is_fresh_at(written_at, Utc::now())
    }
}

/// Human readable age, e.g. "just now", "5m ago", "2h ago", "3d ago".
pub fn age_display(written_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - written_at).num_minutes();
    if minutes < 1 {
        // Future timestamps from clock skew land here too
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
