//! Sequencer state as seen from outside the control task

use serde::{Deserialize, Serialize};

pub use tilawa_common::events::SequencerState;

/// Consistent view of the sequencer published after every transition
///
/// Cursor and state always come from the same fully applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: SequencerState,
    pub cursor: usize,
    pub track_count: usize,
    /// Playing intent with no voice sounding yet, because the track at the
    /// cursor is still decoding
    pub awaiting_buffer: bool,
}

impl Snapshot {
    /// Playing intent, including while waiting on an underrun
    pub fn is_playing(&self) -> bool {
        self.state == SequencerState::Playing
    }
}
