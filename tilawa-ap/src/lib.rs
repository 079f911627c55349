//! # Tilawa Audio Player Library (tilawa-ap)
//!
//! Gapless sequential playback of short recitation clips.
//!
//! **Purpose:** Decode a list of tracks ahead of time and play them back to
//! back with no audible gap between clips.
//!
//! **Architecture:** A single control task (`Sequencer`) owns a two-slot
//! buffer cache and one output session. Decoding (symphonia + rubato) runs in
//! background tasks; output goes to cpal or a headless virtual device.

pub mod audio;
pub mod error;
pub mod playback;

pub use error::{DecodeError, Error, Result};
pub use playback::{Notifications, Sequencer, SequencerOptions, SequencerState, Snapshot};
pub use tilawa_common::config::UnderrunPolicy;
pub use tilawa_common::events::{BufferSlot, SequencerEvent};
