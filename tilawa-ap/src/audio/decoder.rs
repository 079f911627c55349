//! Audio decoder using symphonia
//!
//! Decodes a whole track (MP3, FLAC, AAC, Vorbis, WAV) to interleaved stereo
//! f32 at the output sample rate.

use crate::audio::resampler::Resampler;
use crate::audio::source::{SourceFetcher, TrackSource};
use crate::audio::types::DecodedBuffer;
use crate::error::DecodeError;
use futures::future::BoxFuture;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Turns a track source into a ready-to-play buffer
///
/// Implementations must be cheap to call concurrently: the sequencer may have
/// one decode for the current slot and one for the next slot in flight.
pub trait Decoder: Send + Sync + 'static {
    fn decode(&self, source: &TrackSource) -> BoxFuture<'static, Result<DecodedBuffer, DecodeError>>;
}

/// Decoder backed by symphonia (codecs) and rubato (resampling).
///
/// Fetching runs on the async runtime; demuxing, decoding and resampling run
/// on the blocking pool.
#[derive(Clone)]
pub struct SymphoniaDecoder {
    fetcher: SourceFetcher,
    output_rate: u32,
}

impl SymphoniaDecoder {
    pub fn new(fetcher: SourceFetcher, output_rate: u32) -> Self {
        Self {
            fetcher,
            output_rate,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&self, source: &TrackSource) -> BoxFuture<'static, Result<DecodedBuffer, DecodeError>> {
        let fetcher = self.fetcher.clone();
        let source = source.clone();
        let output_rate = self.output_rate;

        Box::pin(async move {
            let bytes = fetcher.fetch(&source).await?;
            let hint = source.extension();
            debug!(source = %source, bytes = bytes.len(), "Decoding track");

            tokio::task::spawn_blocking(move || decode_bytes(bytes, hint.as_deref(), output_rate))
                .await
                .map_err(|e| DecodeError::Codec(format!("decode task failed: {}", e)))?
        })
    }
}

/// Decode an in-memory compressed stream.
///
/// Mono is duplicated to both channels; streams with more than two channels
/// keep the front left/right pair. Corrupt packets are skipped.
pub fn decode_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
    output_rate: u32,
) -> Result<DecodedBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let mut source_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    let mut stereo: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count();
                if channels == 0 {
                    continue;
                }
                source_rate.get_or_insert(spec.rate);

                let needed = decoded.capacity() * channels;
                if sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                    sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    push_stereo(buf.samples(), channels, &mut stereo);
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt packet: {}", e);
            }
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        }
    }

    if stereo.is_empty() {
        return Err(DecodeError::Empty);
    }
    let source_rate =
        source_rate.ok_or_else(|| DecodeError::Codec("sample rate unknown".to_string()))?;

    debug!(
        frames = stereo.len() / 2,
        source_rate, output_rate, "Decoded track"
    );

    let samples = Resampler::resample(stereo, source_rate, output_rate, 2)?;
    let buffer = DecodedBuffer::new(samples, output_rate);
    if buffer.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(buffer)
}

/// Append interleaved `channels`-wide frames to `out` as stereo
fn push_stereo(samples: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.reserve(samples.len() / channels * 2);
    for frame in samples.chunks_exact(channels) {
        match frame {
            [mono] => {
                out.push(*mono);
                out.push(*mono);
            }
            [left, right, ..] => {
                out.push(*left);
                out.push(*right);
            }
            [] => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_stereo_duplicates_mono() {
        let mut out = Vec::new();
        push_stereo(&[0.1, 0.2, 0.3], 1, &mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_push_stereo_keeps_front_pair() {
        let mut out = Vec::new();
        push_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_garbage_is_unsupported_format() {
        let err = decode_bytes(vec![0x42; 512], Some("mp3"), 44100).unwrap_err();
        assert!(
            matches!(err, DecodeError::UnsupportedFormat(_) | DecodeError::Empty),
            "unexpected error: {:?}",
            err
        );
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(decode_bytes(Vec::new(), None, 44100).is_err());
    }
}
