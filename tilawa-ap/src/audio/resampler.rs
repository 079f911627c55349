//! Audio resampling using rubato
//!
//! Converts decoded audio to the output device's sample rate so that every
//! buffer in the cache can be handed to the output without conversion.

use crate::error::DecodeError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Audio resampler using rubato for sample rate conversion.
pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`.
    ///
    /// If the rates already match, returns the input unchanged.
    pub fn resample(
        input: Vec<f32>,
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>, DecodeError> {
        if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(input);
        }
        if channels == 0 || input_rate == 0 || output_rate == 0 {
            return Err(DecodeError::Resample(format!(
                "invalid parameters: {}Hz -> {}Hz, {} channels",
                input_rate, output_rate, channels
            )));
        }

        let planar_input = Self::deinterleave(&input, channels);
        let input_frames = planar_input.first().map_or(0, Vec::len);
        if input_frames == 0 {
            return Ok(Vec::new());
        }

        debug!(
            "Resampling {} frames from {}Hz to {}Hz ({} channels)",
            input_frames, input_rate, output_rate, channels
        );

        // One chunk covering the whole track: buffers are short recitation clips
        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;

        Ok(Self::interleave(planar_output))
    }

    /// Convert interleaved samples to planar format.
    ///
    /// Input:  [L, R, L, R, L, R, ...]
    /// Output: [[L, L, L, ...], [R, R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;

        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }
        planar
    }

    /// Convert planar samples to interleaved format.
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        let num_channels = planar.len();
        let num_frames = planar.iter().map(Vec::len).min().unwrap_or(0);
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);

        for frame_idx in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }
        interleaved
    }
}
