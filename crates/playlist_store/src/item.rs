use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provenance info attached by whichever source produced an item
pub type Metadata = HashMap<String, Value>;

/// One playable entry of a collection.
///
/// Serialized field names are part of the on-disk format: every field is
/// always written, missing optional fields are accepted on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistItem {
    pub title: String,
    pub url: String,
    /// Duration in seconds
    #[serde(rename = "duration", default)]
    pub duration_seconds: Option<f64>,
    #[serde(rename = "thumbnail", default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub favorite: bool,
}

impl PlaylistItem {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            duration_seconds: None,
            thumbnail_url: None,
            metadata: HashMap::new(),
            played: false,
            favorite: false,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_metadata<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.metadata
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns why the item cannot be stored, if anything.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.url.trim().is_empty() {
            return Err("url must not be empty".to_string());
        }
        if let Some(duration) = self.duration_seconds {
            if !duration.is_finite() || duration < 0.0 {
                return Err(format!("invalid duration {duration}"));
            }
        }
        Ok(())
    }
}
