use serde::Serialize;

/// Classification of a failure the coordinator absorbed.
///
/// None of these ever reach the caller of `initialize` or `refresh`; the most
/// recent one is kept in state so a front end can explain why it is showing
/// cached or default data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Storage read, write or clear failed.
    CacheUnavailable,
    /// Stored data was present but unreadable.
    CacheCorrupt,
    /// The connectivity query failed; treated as online.
    ConnectivityUnknown,
    /// Network error, bad response, timeout, or an empty result set.
    RemoteFetchFailed,
}

impl FailureKind {
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::CacheUnavailable => "offline cache unavailable",
            FailureKind::CacheCorrupt => "offline cache was corrupt",
            FailureKind::ConnectivityUnknown => "network status unknown",
            FailureKind::RemoteFetchFailed => "could not reach the directory service",
        }
    }
}
