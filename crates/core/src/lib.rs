//! Core library for the interactive storybook player.
//!
//! Given a parsed [`Book`], the engine resolves hotspot presses to media
//! URLs, serves them from a deduplicating cache, warms the cache for
//! neighbouring pages in the background and keeps at most one playable
//! active at a time, falling back to a synthesized tone when the platform
//! cannot play the real media.

pub mod book;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod perf;
pub mod playback;
pub mod preload;
pub mod resolver;
pub mod tone;

#[cfg(test)]
mod testing;

pub use book::{Book, Button, Page};
pub use cache::{
    CacheEntry, CacheStore, FetchEvent, FetchObserver, FileFetcher, HttpFetcher, MediaFetcher,
    MediaHandle, SourceFetcher,
};
pub use config::{CacheConfig, EngineConfig, PreloadConfig, ToneConfig};
pub use engine::BookPlayer;
pub use error::{Result, StorybookError};
pub use manifest::{ManifestLoader, ManifestLocation};
pub use perf::{PerformanceStats, PerformanceTracker};
pub use playback::{
    ActivePlayable, HeadlessOutput, MediaOutput, MediaSource, PlayOutcome, PlayableHandle,
    PlaybackController, PlaybackState,
};
pub use preload::{PreloadReport, Preloader};
pub use resolver::{MediaKind, MediaResolver};
pub use tone::{SineToneSynthesizer, ToneSynthesizer};
