use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub tone: ToneConfig,
    pub preload: PreloadConfig,
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Configuration specific to the media cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// LRU bound on the number of cached handles.
    pub max_entries: usize,
    pub fetch_timeout_ms: u64,
}

impl CacheConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 64,
            fetch_timeout_ms: 15_000,
        }
    }
}

/// Parameters of the fallback cue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToneConfig {
    pub sample_rate: u32,
    pub frequency_hz: f32,
    pub start_gain: f32,
    pub end_gain: f32,
    pub duration_ms: u64,
}

impl ToneConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frequency_hz: 440.0,
            start_gain: 0.1,
            end_gain: 0.01,
            duration_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreloadConfig {
    pub enabled: bool,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
