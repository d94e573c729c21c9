use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{null_as_default, null_as_true};

/// Kind of media a resource points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Article,
    Video,
    Audio,
    Pdf,
    #[serde(other)]
    Other,
}

impl ResourceType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceType::Article => "Article",
            ResourceType::Video => "Video",
            ResourceType::Audio => "Audio",
            ResourceType::Pdf => "PDF",
            ResourceType::Other => "Resource",
        }
    }
}

/// A self-help article, recording or document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Resource {
    pub id: i64,
    pub title: String,
    pub category: String,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub content: Option<String>,
    /// Length in seconds, for audio and video.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_featured: bool,
    #[serde(default = "default_true", deserialize_with = "null_as_true")]
    pub is_public: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Resource {
    /// Duration rounded to whole minutes, e.g. "12 min".
    pub fn display_duration(&self) -> Option<String> {
        self.duration.map(|secs| {
            let minutes = (secs + 30) / 60;
            if minutes == 0 {
                "<1 min".to_string()
            } else {
                format!("{} min", minutes)
            }
        })
    }
}
