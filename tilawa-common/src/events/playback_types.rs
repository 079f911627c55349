//! Playback-related type definitions
//!
//! Supporting types for sequencer state and the two-slot buffer cache.

use serde::{Deserialize, Serialize};

/// Sequencer lifecycle state
///
/// `Ready` and `Stopped` both hold a current buffer that is not sounding;
/// `Stopped` additionally guarantees the cursor sits at track 0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SequencerState {
    /// No track list loaded yet
    #[default]
    Uninitialized,
    /// Current buffer loaded, not sounding
    Ready,
    /// Current buffer sounding (or about to, while the next buffer lands)
    Playing,
    /// Playback halted by the caller, cursor retained
    Paused,
    /// Playback halted, cursor reset to 0
    Stopped,
    /// Unrecoverable failure, re-initialize before playing again
    Faulted,
}

impl SequencerState {
    /// Whether `play()` is accepted from this state
    pub fn can_play(self) -> bool {
        matches!(
            self,
            SequencerState::Ready | SequencerState::Paused | SequencerState::Stopped
        )
    }
}

impl std::fmt::Display for SequencerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequencerState::Uninitialized => write!(f, "uninitialized"),
            SequencerState::Ready => write!(f, "ready"),
            SequencerState::Playing => write!(f, "playing"),
            SequencerState::Paused => write!(f, "paused"),
            SequencerState::Stopped => write!(f, "stopped"),
            SequencerState::Faulted => write!(f, "faulted"),
        }
    }
}

/// One of the two buffer cache slots
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BufferSlot {
    /// Track presently playing or about to play
    Current,
    /// Track immediately after current, preloaded
    Next,
}

impl std::fmt::Display for BufferSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferSlot::Current => write!(f, "current"),
            BufferSlot::Next => write!(f, "next"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_play() {
        assert!(SequencerState::Ready.can_play());
        assert!(SequencerState::Paused.can_play());
        assert!(SequencerState::Stopped.can_play());
        assert!(!SequencerState::Playing.can_play());
        assert!(!SequencerState::Uninitialized.can_play());
        assert!(!SequencerState::Faulted.can_play());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&SequencerState::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
        assert_eq!(SequencerState::default(), SequencerState::Uninitialized);
    }
}
