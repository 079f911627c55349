//! WAV fixture generation for decoder tests
//!
//! Writes deterministic 16-bit PCM files with known rate, channel count and
//! length so decoded output can be checked against exact frame counts.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Generate a sine wave WAV file
///
/// # Arguments
/// * `path` - Output file path
/// * `sample_rate` - File sample rate in Hz
/// * `channels` - Channel count (the same tone is written to every channel)
/// * `duration_ms` - Duration in milliseconds
/// * `frequency_hz` - Tone frequency
/// * `amplitude` - 0.0-1.0 (0.5 keeps resampler overshoot away from clipping)
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let amplitude_i16 = amplitude * i16::MAX as f32;

    for frame_idx in 0..frame_count(sample_rate, duration_ms) {
        let t = frame_idx as f32 / sample_rate as f32;
        let sample = ((2.0 * PI * frequency_hz * t).sin() * amplitude_i16) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a stereo file whose left channel is silent and right channel is a tone
pub fn generate_right_only_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    duration_ms: u64,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for frame_idx in 0..frame_count(sample_rate, duration_ms) {
        let t = frame_idx as f32 / sample_rate as f32;
        let sample = ((2.0 * PI * 440.0 * t).sin() * 16000.0) as i16;
        writer.write_sample(0i16)?;
        writer.write_sample(sample)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Frames in `duration_ms` at `sample_rate`
pub fn frame_count(sample_rate: u32, duration_ms: u64) -> u64 {
    (sample_rate as u64 * duration_ms) / 1000
}
