//! Core audio data types
//!
//! Defines the decoded buffer held by the cache and the frame type handed to
//! the output device.

use std::time::Duration;

/// DecodedBuffer holds one track's decoded and resampled audio, ready to play.
///
/// The whole track lives in RAM. Buffers are immutable once built and shared
/// with the output as `Arc<DecodedBuffer>`.
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Stereo interleaved: [L, R, L, R, ...]
/// - Sample rate equals the output rate after resampling
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Number of interleaved channels in every buffer
    pub const CHANNELS: usize = 2;

    /// Wrap interleaved stereo samples
    ///
    /// A trailing half-frame is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32) -> Self {
        let whole = samples.len() - samples.len() % Self::CHANNELS;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
        }
    }

    /// Silent buffer of the given length
    pub fn silence(duration: Duration, sample_rate: u32) -> Self {
        let frames = (duration.as_secs_f64() * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * Self::CHANNELS], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames
    pub fn frame_count(&self) -> usize {
        self.samples.len() / Self::CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playing time at the buffer's sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Get duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frame_count() as u64 * 1000) / self.sample_rate as u64
    }

    /// Get audio frame at specific frame index
    pub fn frame(&self, frame_index: usize) -> Option<AudioFrame> {
        let i = frame_index * Self::CHANNELS;
        match (self.samples.get(i), self.samples.get(i + 1)) {
            (Some(&left), Some(&right)) => Some(AudioFrame { left, right }),
            _ => None,
        }
    }
}

/// AudioFrame represents a single stereo sample (one frame of audio).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFrame {
    /// Left channel sample
    pub left: f32,

    /// Right channel sample
    pub right: f32,
}

impl AudioFrame {
    /// Create a silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        AudioFrame {
            left: 0.0,
            right: 0.0,
        }
    }

    /// Scale both channels and clamp to [-1.0, 1.0]
    pub fn with_gain(self, gain: f32) -> Self {
        AudioFrame {
            left: (self.left * gain).clamp(-1.0, 1.0),
            right: (self.right * gain).clamp(-1.0, 1.0),
        }
    }
}
