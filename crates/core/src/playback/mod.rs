//! Playback state machine.
//!
//! The controller owns at most one active playable. Every `play` stops the
//! current one before anything else happens, and a `play` that was suspended
//! while its media was being cached gives up if a newer `play` or `stop`
//! arrived in the meantime.

mod headless;

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;

use crate::{
    cache::{CacheStore, MediaFetcher, MediaHandle},
    resolver::MediaKind,
    tone::ToneSynthesizer,
    Result,
};

pub use headless::{HeadlessOutput, HeadlessPlayable};

/// What the output is asked to play.
#[derive(Debug, Clone)]
pub enum MediaSource {
    Cached(MediaHandle),
    /// Uncached fallback when the cache could not retrieve the media.
    Direct(String),
}

impl MediaSource {
    pub fn url(&self) -> &str {
        match self {
            MediaSource::Cached(handle) => handle.source_url(),
            MediaSource::Direct(url) => url,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, MediaSource::Cached(_))
    }
}

/// A resource the platform is currently playing.
pub trait ActivePlayable: Send {
    /// Pauses and rewinds. Must be safe to call more than once.
    fn stop(&mut self);
    /// Whether the resource reached its natural end.
    fn is_finished(&self) -> bool;
}

/// Platform playback primitives.
pub trait MediaOutput: Send + Sync {
    fn start_media(&self, kind: MediaKind, source: &MediaSource) -> Result<Box<dyn ActivePlayable>>;
    fn start_pcm(&self, samples: Arc<[f32]>, sample_rate: u32) -> Result<Box<dyn ActivePlayable>>;
}

/// Identifies one playback started by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayableHandle {
    pub id: u64,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "handle")]
pub enum PlaybackState {
    #[default]
    Idle,
    PlayingAudio(PlayableHandle),
    PlayingVideo(PlayableHandle),
    PlayingTone(PlayableHandle),
    Stopped,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.handle().is_some()
    }

    pub fn handle(&self) -> Option<&PlayableHandle> {
        match self {
            PlaybackState::PlayingAudio(handle)
            | PlaybackState::PlayingVideo(handle)
            | PlaybackState::PlayingTone(handle) => Some(handle),
            PlaybackState::Idle | PlaybackState::Stopped => None,
        }
    }
}

/// Result of a single `play` call. Playback failures never escape as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started { kind: MediaKind, cached: bool },
    /// The media was rejected and the fallback tone is playing instead.
    ToneFallback,
    /// Neither the media nor the tone could be played.
    Silent,
    /// A newer `play` or `stop` arrived while the media was being cached.
    Superseded,
}

#[derive(Default)]
struct Slot {
    state: PlaybackState,
    active: Option<Box<dyn ActivePlayable>>,
    generation: u64,
    next_id: u64,
}

impl Slot {
    fn stop_active(&mut self) -> bool {
        match self.active.take() {
            Some(mut playable) => {
                playable.stop();
                tracing::debug!(from = ?self.state, "stopped active playable");
                self.state = PlaybackState::Stopped;
                true
            }
            None => false,
        }
    }

    fn activate(
        &mut self,
        playable: Box<dyn ActivePlayable>,
        state: fn(PlayableHandle) -> PlaybackState,
        url: &str,
    ) {
        let handle = PlayableHandle {
            id: self.next_id,
            url: url.to_string(),
        };
        self.next_id += 1;
        self.active = Some(playable);
        self.state = state(handle);
    }

    fn reap_finished(&mut self) {
        if self.active.as_ref().is_some_and(|playable| playable.is_finished()) {
            self.active = None;
            tracing::debug!(from = ?self.state, "playback reached its end");
            self.state = PlaybackState::Idle;
        }
    }
}

pub struct PlaybackController<F> {
    cache: CacheStore<F>,
    output: Arc<dyn MediaOutput>,
    tone: Arc<dyn ToneSynthesizer>,
    slot: Mutex<Slot>,
}

impl<F: MediaFetcher> PlaybackController<F> {
    pub fn new(
        cache: CacheStore<F>,
        output: Arc<dyn MediaOutput>,
        tone: Arc<dyn ToneSynthesizer>,
    ) -> Self {
        Self {
            cache,
            output,
            tone,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub async fn play(&self, url: &str) -> PlayOutcome {
        let generation = {
            let mut slot = self.lock();
            slot.stop_active();
            slot.generation += 1;
            slot.generation
        };

        let kind = MediaKind::classify(url);
        let source = match self.cache.ensure(url).await {
            Ok(handle) => MediaSource::Cached(handle),
            Err(err) => {
                tracing::warn!(url, %err, "playing uncached media");
                MediaSource::Direct(url.to_string())
            }
        };

        let mut slot = self.lock();
        if slot.generation != generation {
            tracing::debug!(url, "play superseded while caching");
            return PlayOutcome::Superseded;
        }

        match self.output.start_media(kind, &source) {
            Ok(playable) => {
                let state: fn(PlayableHandle) -> PlaybackState = match kind {
                    MediaKind::Audio => PlaybackState::PlayingAudio,
                    MediaKind::Video => PlaybackState::PlayingVideo,
                };
                slot.activate(playable, state, url);
                tracing::info!(url, ?kind, cached = source.is_cached(), "playing media");
                PlayOutcome::Started {
                    kind,
                    cached: source.is_cached(),
                }
            }
            Err(err) => {
                tracing::warn!(url, %err, "media playback failed, falling back to tone");
                match self.tone.play_fallback() {
                    Ok(playable) => {
                        slot.activate(playable, PlaybackState::PlayingTone, url);
                        PlayOutcome::ToneFallback
                    }
                    Err(err) => {
                        tracing::error!(url, %err, "fallback tone failed");
                        slot.state = PlaybackState::Idle;
                        PlayOutcome::Silent
                    }
                }
            }
        }
    }

    /// Stops whatever is active and cancels any `play` still caching.
    /// Returns `false` when nothing was playing.
    pub fn stop(&self) -> bool {
        let mut slot = self.lock();
        slot.generation += 1;
        slot.stop_active()
    }

    /// Current state, after collecting a playable that ended on its own.
    pub fn state(&self) -> PlaybackState {
        let mut slot = self.lock();
        slot.reap_finished();
        slot.state.clone()
    }

    /// End-of-media signal from platforms that push it. Stale ids are ignored.
    pub fn notify_ended(&self, id: u64) {
        let mut slot = self.lock();
        if slot.state.handle().is_some_and(|handle| handle.id == id) {
            slot.active = None;
            slot.state = PlaybackState::Idle;
            tracing::debug!(id, "playback ended");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F> fmt::Debug for PlaybackController<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController").finish_non_exhaustive()
    }
}
