use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Parsed book manifest. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub audio_base: String,
    #[serde(default)]
    pub audio_pool: Vec<String>,
    /// Pages in manifest order. The order drives adjacency for preloading.
    #[serde(default)]
    pub pages: IndexMap<String, Page>,
}

impl Book {
    /// Parses a manifest; unknown fields are ignored.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// `audio_base` with a guaranteed trailing `/`.
    pub fn normalized_base(&self) -> String {
        if self.audio_base.ends_with('/') {
            self.audio_base.clone()
        } else {
            format!("{}/", self.audio_base)
        }
    }

    /// Looks up a page by id.
    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.get(id)
    }

    pub fn has_page(&self, id: &str) -> bool {
        self.pages.contains_key(id)
    }

    /// Page ids in manifest order.
    pub fn page_ids(&self) -> Vec<String> {
        self.pages.keys().cloned().collect()
    }

    /// Position of `id` in manifest order.
    pub fn page_index(&self, id: &str) -> Option<usize> {
        self.pages.get_index_of(id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Page {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub buttons: Vec<Button>,
    /// Indices into [`Book::audio_pool`], addressed by [`Button::pos`].
    #[serde(default)]
    pub sequence: Vec<i64>,
}

/// Clickable hotspot. Coordinates are fractions of the page size.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Button {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<usize>,
    /// Takes precedence over `pos` when present.
    #[serde(
        rename = "override",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub override_src: Option<String>,
}

impl Button {
    pub fn at_pos(pos: usize) -> Self {
        Self {
            pos: Some(pos),
            ..Default::default()
        }
    }

    pub fn with_override(src: impl Into<String>) -> Self {
        Self {
            override_src: Some(src.into()),
            ..Default::default()
        }
    }
}
