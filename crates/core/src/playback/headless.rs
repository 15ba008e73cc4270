use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use super::{ActivePlayable, MediaOutput, MediaSource};
use crate::{resolver::MediaKind, Result, StorybookError};

/// Output without an audio device. It logs what would play and reports the
/// media as finished once its nominal duration has elapsed.
#[derive(Debug, Clone)]
pub struct HeadlessOutput {
    rejected: HashSet<MediaKind>,
    media_duration: Duration,
}

impl HeadlessOutput {
    pub fn new(media_duration: Duration) -> Self {
        Self {
            rejected: HashSet::new(),
            media_duration,
        }
    }

    /// Refuse to start media of `kind`, as a platform lacking the codec would.
    pub fn rejecting(mut self, kind: MediaKind) -> Self {
        self.rejected.insert(kind);
        self
    }
}

impl Default for HeadlessOutput {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl MediaOutput for HeadlessOutput {
    fn start_media(&self, kind: MediaKind, source: &MediaSource) -> Result<Box<dyn ActivePlayable>> {
        if self.rejected.contains(&kind) {
            return Err(StorybookError::media_playback(
                source.url(),
                format!("{kind:?} playback is not supported by this output"),
            ));
        }
        let bytes = match source {
            MediaSource::Cached(handle) => handle.len(),
            MediaSource::Direct(_) => 0,
        };
        tracing::info!(url = source.url(), ?kind, bytes, "headless playback started");
        Ok(Box::new(HeadlessPlayable::new(
            source.url().to_string(),
            self.media_duration,
        )))
    }

    fn start_pcm(&self, samples: Arc<[f32]>, sample_rate: u32) -> Result<Box<dyn ActivePlayable>> {
        if sample_rate == 0 {
            return Err(StorybookError::msg("pcm output requires a sample rate"));
        }
        let duration = Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate));
        tracing::info!(samples = samples.len(), sample_rate, ?duration, "headless tone started");
        Ok(Box::new(HeadlessPlayable::new("tone".to_string(), duration)))
    }
}

#[derive(Debug)]
pub struct HeadlessPlayable {
    label: String,
    started: Instant,
    duration: Duration,
    stopped: bool,
}

impl HeadlessPlayable {
    fn new(label: String, duration: Duration) -> Self {
        Self {
            label,
            started: Instant::now(),
            duration,
            stopped: false,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.started.elapsed())
    }
}

impl ActivePlayable for HeadlessPlayable {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            tracing::info!(label = %self.label, "headless playback stopped");
        }
    }

    fn is_finished(&self) -> bool {
        self.stopped || self.started.elapsed() >= self.duration
    }
}
