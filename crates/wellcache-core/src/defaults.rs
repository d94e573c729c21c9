//! Directory content bundled with the application.
//!
//! Served whenever there is no usable cache and no remote fetch has
//! succeeded yet.

use std::sync::{Arc, OnceLock};

use tracing::error;

use crate::models::DirectoryPayload;

const STATIC_DIRECTORY_JSON: &str = include_str!("../data/static_directory.json");

static STATIC_DIRECTORY: OnceLock<Arc<DirectoryPayload>> = OnceLock::new();

/// The bundled directory, parsed once per process.
pub fn static_directory() -> Arc<DirectoryPayload> {
    Arc::clone(STATIC_DIRECTORY.get_or_init(|| Arc::new(parse_bundled(STATIC_DIRECTORY_JSON))))
}

/// Bundled data that fails to parse is a packaging bug; log it and fall back to
/// an empty directory instead of taking the app down.
fn parse_bundled(json: &str) -> DirectoryPayload {
    let parsed = serde_json::from_str::<DirectoryPayload>(json)
        .map_err(|e| e.to_string())
        .and_then(|payload| payload.validate().map(|_| payload).map_err(|e| e.to_string()));

    match parsed {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "Bundled directory data is invalid");
            DirectoryPayload::default()
        }
    }
}
