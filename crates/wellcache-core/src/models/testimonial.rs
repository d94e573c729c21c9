use serde::{Deserialize, Serialize};

use super::null_as_default;

/// Highest rating a client can leave.
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Testimonial {
    pub id: i64,
    pub client_name: String,
    pub content: String,
    pub rating: u8,
    #[serde(default)]
    pub service_category: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_featured: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_approved: bool,
}

impl Testimonial {
    pub fn has_valid_rating(&self) -> bool {
        (1..=MAX_RATING).contains(&self.rating)
    }

    /// Rating as filled and empty stars, e.g. "★★★★☆".
    pub fn stars(&self) -> String {
        let filled = self.rating.min(MAX_RATING) as usize;
        let mut out = "★".repeat(filled);
        out.push_str(&"☆".repeat(MAX_RATING as usize - filled));
        out
    }
}
