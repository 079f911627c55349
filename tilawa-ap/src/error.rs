//! Error types for tilawa-ap
//!
//! `Error` is what the public control surface returns; `DecodeError` is what a
//! decoder returns and is carried inside `Error::Decode`.

use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// `initialize` was given no tracks
    #[error("Track list is empty")]
    EmptyTrackList,

    /// `play_track` index outside `0..len`
    #[error("Invalid track index {index} (track list has {len} tracks)")]
    InvalidTrackIndex { index: usize, len: usize },

    /// Playback requested before a successful `initialize`, or after a fault
    #[error("Sequencer is not initialized")]
    NotInitialized,

    /// A track could not be fetched or decoded
    #[error("Decode failed for track {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },

    /// Promotion requested before the next buffer finished decoding
    #[error("No buffer ready to promote")]
    NoBufferReady,

    /// Audio device or session unusable
    #[error("Audio output unavailable: {0}")]
    OutputUnavailable(String),

    /// The request was superseded by a newer one before it completed
    #[error("Request superseded by a newer request")]
    Cancelled,

    /// The sequencer was destroyed
    #[error("Sequencer has been shut down")]
    ShutDown,

    /// Configuration loading error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<tilawa_common::Error> for Error {
    fn from(err: tilawa_common::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Why a track could not be turned into a `DecodedBuffer`
///
/// String-carrying so the same error can be returned to the caller and
/// broadcast to listeners.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Local file could not be read
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    /// HTTP fetch failed (connection, status or timeout)
    #[error("Failed to fetch audio: {0}")]
    Fetch(String),

    /// Container format not recognised
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Container holds no decodable audio track
    #[error("No audio track found")]
    NoAudioTrack,

    /// Codec could not be created or failed fatally
    #[error("Codec error: {0}")]
    Codec(String),

    /// Stream decoded to zero frames
    #[error("Decoded stream contains no audio")]
    Empty,

    /// Sample-rate conversion failed
    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Convenience Result type using tilawa-ap Error
pub type Result<T> = std::result::Result<T, Error>;
