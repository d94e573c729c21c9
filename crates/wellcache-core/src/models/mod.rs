//! Data models for the wellness directory.
//!
//! - `Service`: practitioners and organisations
//! - `Resource`: articles, recordings and documents
//! - `Testimonial`: client feedback
//! - `DirectoryPayload`: all three as the unit that gets cached

pub mod payload;
pub mod resource;
pub mod service;
pub mod testimonial;

pub use payload::{DataSource, DirectoryPayload, ValidationError};
pub use resource::{Resource, ResourceType};
pub use service::{Service, ServiceDetails};
pub use testimonial::{Testimonial, MAX_RATING};

use serde::{Deserialize, Deserializer};

// Helper for nullable backend columns: an explicit null reads as the default
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Helper for flags that default to on, such as `is_active`
pub(crate) fn null_as_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}
