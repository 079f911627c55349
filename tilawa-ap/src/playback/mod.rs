//! Gapless playback: buffer cache, preloading, output scheduling and the
//! sequencer that ties them together

pub mod cache;
pub mod engine;
pub mod notify;
pub mod preload;
pub mod sequencer;
pub mod state;

pub use cache::{BufferCache, CachedTrack};
pub use engine::{PlaybackEngine, PlaybackHandle};
pub use notify::Notifications;
pub use sequencer::{Sequencer, SequencerOptions};
pub use state::{SequencerState, Snapshot};
