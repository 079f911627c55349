//! Caller notifications
//!
//! The control loop queues notes while it applies a transition and flushes
//! them once the new snapshot is published. Each note goes to the event bus
//! and to the matching optional callback.

use crate::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tilawa_common::events::{BufferSlot, EventBus, SequencerEvent, SequencerState};
use tracing::error;

type IndexCallback = Arc<dyn Fn(usize) + Send + Sync>;
type FlagCallback = Arc<dyn Fn(bool) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Optional callbacks supplied when the sequencer is spawned
///
/// Callbacks run on the control task. A panicking callback is logged and
/// does not affect playback.
#[derive(Clone, Default)]
pub struct Notifications {
    on_track_changed: Option<IndexCallback>,
    on_play_state_changed: Option<FlagCallback>,
    on_error: Option<ErrorCallback>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired on every cursor change, including the reset to 0
    pub fn on_track_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_track_changed = Some(Arc::new(f));
        self
    }

    pub fn on_play_state_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_play_state_changed = Some(Arc::new(f));
        self
    }

    /// Fired for every decode or output failure, foreground or background
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for Notifications {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications")
            .field("on_track_changed", &self.on_track_changed.is_some())
            .field("on_play_state_changed", &self.on_play_state_changed.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum Note {
    TrackChanged { index: usize, track_count: usize },
    PlayStateChanged(bool),
    StateChanged { old: SequencerState, new: SequencerState },
    BufferReady { index: usize, slot: BufferSlot, duration_ms: u64 },
    Failure { index: Option<usize>, error: Error, fatal: bool },
}

pub(crate) struct Notifier {
    callbacks: Notifications,
    bus: EventBus,
    queue: Vec<Note>,
}

impl Notifier {
    pub(crate) fn new(callbacks: Notifications, bus: EventBus) -> Self {
        Self {
            callbacks,
            bus,
            queue: Vec::new(),
        }
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub(crate) fn push(&mut self, note: Note) {
        self.queue.push(note);
    }

    /// Deliver everything queued since the last flush, in order
    pub(crate) fn flush(&mut self) {
        for note in std::mem::take(&mut self.queue) {
            self.deliver(note);
        }
    }

    fn deliver(&self, note: Note) {
        match note {
            Note::TrackChanged { index, track_count } => {
                self.bus
                    .emit_lossy(SequencerEvent::track_changed(index, track_count));
                if let Some(cb) = &self.callbacks.on_track_changed {
                    guarded("on_track_changed", || cb(index));
                }
            }
            Note::PlayStateChanged(is_playing) => {
                self.bus
                    .emit_lossy(SequencerEvent::play_state_changed(is_playing));
                if let Some(cb) = &self.callbacks.on_play_state_changed {
                    guarded("on_play_state_changed", || cb(is_playing));
                }
            }
            Note::StateChanged { old, new } => {
                self.bus.emit_lossy(SequencerEvent::state_changed(old, new));
            }
            Note::BufferReady {
                index,
                slot,
                duration_ms,
            } => {
                self.bus
                    .emit_lossy(SequencerEvent::buffer_ready(index, slot, duration_ms));
            }
            Note::Failure {
                index,
                error,
                fatal,
            } => {
                self.bus
                    .emit_lossy(SequencerEvent::error(index, error.to_string(), fatal));
                if let Some(cb) = &self.callbacks.on_error {
                    guarded("on_error", || cb(&error));
                }
            }
        }
    }
}

fn guarded(name: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("Notification callback {} panicked", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_flush_delivers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&seen), Arc::clone(&seen));
        let callbacks = Notifications::new()
            .on_track_changed(move |i| a.lock().unwrap().push(format!("track {}", i)))
            .on_play_state_changed(move |p| b.lock().unwrap().push(format!("playing {}", p)));

        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let mut notifier = Notifier::new(callbacks, bus);

        notifier.push(Note::PlayStateChanged(true));
        notifier.push(Note::TrackChanged {
            index: 2,
            track_count: 3,
        });
        assert!(seen.lock().unwrap().is_empty());

        notifier.flush();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["playing true".to_string(), "track 2".to_string()]
        );
        assert_eq!(rx.try_recv().unwrap().event_type(), "PlayStateChanged");
        assert_eq!(rx.try_recv().unwrap().event_type(), "TrackChanged");
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let callbacks = Notifications::new().on_error(|_| panic!("listener bug"));
        let mut notifier = Notifier::new(callbacks, EventBus::new(4));
        notifier.push(Note::Failure {
            index: Some(1),
            error: Error::NoBufferReady,
            fatal: false,
        });
        notifier.flush();
    }

    #[test]
    fn test_buffer_ready_goes_to_bus_only() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let mut notifier = Notifier::new(Notifications::new(), bus);
        notifier.push(Note::BufferReady {
            index: 1,
            slot: BufferSlot::Next,
            duration_ms: 1500,
        });
        notifier.flush();

        match rx.try_recv().unwrap() {
            SequencerEvent::BufferReady {
                index, duration_ms, ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(duration_ms, 1500);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
