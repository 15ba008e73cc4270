use std::{f32::consts::PI, sync::Arc};

use crate::{
    config::ToneConfig,
    playback::{ActivePlayable, MediaOutput},
    Result, StorybookError,
};

/// Produces an audible "something happened" cue when real media cannot play.
pub trait ToneSynthesizer: Send + Sync {
    fn play_fallback(&self) -> Result<Box<dyn ActivePlayable>>;
}

/// Sine cue with an exponentially decaying envelope, rendered up front and
/// handed to the output as a finite PCM buffer so it stops on its own.
pub struct SineToneSynthesizer {
    config: ToneConfig,
    output: Arc<dyn MediaOutput>,
}

impl SineToneSynthesizer {
    pub fn new(config: ToneConfig, output: Arc<dyn MediaOutput>) -> Self {
        Self { config, output }
    }
}

impl ToneSynthesizer for SineToneSynthesizer {
    fn play_fallback(&self) -> Result<Box<dyn ActivePlayable>> {
        let samples = render_tone(&self.config)?;
        tracing::debug!(
            frequency_hz = self.config.frequency_hz,
            samples = samples.len(),
            "starting fallback tone"
        );
        self.output
            .start_pcm(samples, self.config.sample_rate)
            .map_err(|err| StorybookError::ToneSynthesis(err.to_string()))
    }
}

/// Gain at `seconds` into the cue: `start * (end / start) ^ (t / T)`.
pub fn envelope_at(config: &ToneConfig, seconds: f32) -> f32 {
    let total = config.duration().as_secs_f32();
    if total <= 0.0 {
        return config.end_gain;
    }
    let progress = (seconds / total).clamp(0.0, 1.0);
    config.start_gain * (config.end_gain / config.start_gain).powf(progress)
}

/// Renders the mono cue described by `config`.
pub fn render_tone(config: &ToneConfig) -> Result<Arc<[f32]>> {
    if config.sample_rate == 0 {
        return Err(StorybookError::ToneSynthesis("sample rate must be positive".into()));
    }
    // An exponential ramp cannot start or end at zero.
    if config.start_gain <= 0.0 || config.end_gain <= 0.0 {
        return Err(StorybookError::ToneSynthesis(
            "envelope gains must be positive".into(),
        ));
    }

    let sample_rate = config.sample_rate as f32;
    let len = (config.sample_rate as u64 * config.duration_ms / 1_000) as usize;
    let step = 2.0 * PI * config.frequency_hz / sample_rate;

    Ok((0..len)
        .map(|i| {
            let t = i as f32 / sample_rate;
            envelope_at(config, t) * (step * i as f32).sin()
        })
        .collect())
}
