//! Parameters for facade operations.

use serde::{Deserialize, Serialize};

/// Load a tour and wait until it is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTour {
    pub url: String,
    /// Start playback as soon as the tour is loaded.
    #[serde(default)]
    pub play: bool,
}

impl LoadTour {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            play: false,
        }
    }

    pub fn playing(mut self) -> Self {
        self.play = true;
        self
    }
}

/// Load a WTML image collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadImageCollection {
    pub url: String,
    /// Also load child folders referenced by the collection. Not part of the
    /// cache key: the first request for a URL decides.
    #[serde(default)]
    pub load_child_folders: bool,
}

impl LoadImageCollection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            load_child_folders: false,
        }
    }

    pub fn with_child_folders(mut self) -> Self {
        self.load_child_folders = true;
        self
    }
}
