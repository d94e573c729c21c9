use thiserror::Error;

use crate::error::FailureKind;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache storage unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    #[error("Cached data is corrupt: {0}")]
    Corrupt(String),
}

impl CacheError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CacheError::Unavailable(_) => FailureKind::CacheUnavailable,
            CacheError::Corrupt(_) => FailureKind::CacheCorrupt,
        }
    }
}
