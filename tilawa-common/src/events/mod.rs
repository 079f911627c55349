//! Event types for the Tilawa event system
//!
//! Provides the sequencer event definitions and the EventBus used to fan them
//! out to any number of listeners.

mod playback_types;

pub use playback_types::{BufferSlot, SequencerState};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Sequencer event types
///
/// Events are broadcast via EventBus and can be serialized (one JSON object per
/// event, tagged by `type`) for display or logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SequencerEvent {
    /// Playback cursor moved
    ///
    /// Fired on every cursor change, including the reset to 0 on stop and at
    /// the end of the track list. Also fired by `play()` with the current
    /// cursor.
    TrackChanged {
        /// New cursor position (0-based)
        index: usize,
        /// Length of the loaded track list
        track_count: usize,
        /// When the cursor moved
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Audible playback started or stopped
    PlayStateChanged {
        /// Whether the sequencer is now playing
        is_playing: bool,
        /// When the play state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Lifecycle state transition
    StateChanged {
        /// State before the transition
        old_state: SequencerState,
        /// State after the transition
        new_state: SequencerState,
        /// When the state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A decoded buffer landed in the cache
    BufferReady {
        /// Track index the buffer belongs to
        index: usize,
        /// Slot the buffer was stored in
        slot: BufferSlot,
        /// Decoded duration in milliseconds
        duration_ms: u64,
        /// When the buffer became ready
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Decode or output failure, foreground or background
    Error {
        /// Track index involved, if any
        index: Option<usize>,
        /// Human-readable error message
        message: String,
        /// Whether the failure faulted the sequencer
        fatal: bool,
        /// When the error occurred
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SequencerEvent {
    /// Build a `TrackChanged` event stamped now
    pub fn track_changed(index: usize, track_count: usize) -> Self {
        SequencerEvent::TrackChanged {
            index,
            track_count,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Build a `PlayStateChanged` event stamped now
    pub fn play_state_changed(is_playing: bool) -> Self {
        SequencerEvent::PlayStateChanged {
            is_playing,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Build a `StateChanged` event stamped now
    pub fn state_changed(old_state: SequencerState, new_state: SequencerState) -> Self {
        SequencerEvent::StateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Build a `BufferReady` event stamped now
    pub fn buffer_ready(index: usize, slot: BufferSlot, duration_ms: u64) -> Self {
        SequencerEvent::BufferReady {
            index,
            slot,
            duration_ms,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Build an `Error` event stamped now
    pub fn error(index: Option<usize>, message: impl Into<String>, fatal: bool) -> Self {
        SequencerEvent::Error {
            index,
            message: message.into(),
            fatal,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Get event type as string (matches the serde tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            SequencerEvent::TrackChanged { .. } => "TrackChanged",
            SequencerEvent::PlayStateChanged { .. } => "PlayStateChanged",
            SequencerEvent::StateChanged { .. } => "StateChanged",
            SequencerEvent::BufferReady { .. } => "BufferReady",
            SequencerEvent::Error { .. } => "Error",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for sequencer events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the control loop)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use tilawa_common::events::{EventBus, SequencerEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SequencerEvent::track_changed(1, 3));
///
/// match rx.try_recv() {
///     Ok(SequencerEvent::TrackChanged { index, .. }) => assert_eq!(index, 1),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SequencerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// A capacity of 0 is bumped to 1 (tokio rejects empty broadcast channels).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SequencerEvent,
    ) -> Result<usize, broadcast::error::SendError<SequencerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SequencerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
