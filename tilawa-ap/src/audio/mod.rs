//! Audio subsystem: sources, decoding, resampling and output

pub mod decoder;
pub mod output;
pub mod resampler;
pub mod resolver;
pub mod source;
pub mod types;

pub use decoder::{Decoder, SymphoniaDecoder};
pub use output::{
    CpalOutput, FaultNotifier, OutputBackend, OutputSession, VirtualController, VirtualOutput,
    Voice,
};
pub use resampler::Resampler;
pub use resolver::{TrackResolver, VerseAudioLocator};
pub use source::{SourceFetcher, TrackSource};
pub use types::{AudioFrame, DecodedBuffer};
