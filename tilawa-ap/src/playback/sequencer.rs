//! Gapless sequencer
//!
//! `Sequencer` is a cheap, cloneable handle onto a single control task. The
//! task owns the buffer cache, the playback engine, the cursor and the state
//! machine, and is the only writer of any of them. Three inputs feed it:
//!
//! - commands from handles (mpsc, each with a oneshot reply)
//! - decode results from the preloader
//! - internal events: natural completion of a voice, output device faults
//!
//! After each input is fully applied the task publishes a `Snapshot`, then
//! delivers the queued notifications, then answers the callers. A caller whose
//! `play().await` has returned therefore already sees the new snapshot.
//!
//! Requests that need a buffer that is still decoding (`initialize`, `play`
//! after the cache moved, `play_track` to an uncached index) are parked and
//! answered when the decode lands. A newer request supersedes a parked one,
//! which is answered with `Error::Cancelled`.

use super::cache::{BufferCache, CachedTrack};
use super::engine::{PlaybackEngine, PlaybackHandle};
use super::notify::{Note, Notifications, Notifier};
use super::preload::{DecodeOutcome, Preloader};
use super::state::{SequencerState, Snapshot};
use crate::audio::{Decoder, OutputBackend, TrackSource};
use crate::error::{DecodeError, Error, Result};
use std::sync::Arc;
use tilawa_common::config::{TomlConfig, UnderrunPolicy};
use tilawa_common::events::{BufferSlot, EventBus, SequencerEvent};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Depth of the command channel between handles and the control task
const COMMAND_CAPACITY: usize = 32;

type Reply = oneshot::Sender<Result<()>>;
type Ack = oneshot::Sender<()>;

enum Command {
    Initialize { sources: Vec<TrackSource>, reply: Reply },
    Play { reply: Reply },
    Pause { reply: Ack },
    Stop { reply: Ack },
    PlayTrack { index: usize, reply: Reply },
    Destroy { reply: Ack },
}

#[derive(Debug)]
enum Internal {
    TrackFinished { handle: u64 },
    OutputFault { session: u64, message: String },
}

/// Tunables for one sequencer instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerOptions {
    /// What to do when a track ends before its successor has decoded
    pub underrun_policy: UnderrunPolicy,
    /// Single-track gain, clamped to `0.0..=2.0`
    pub gain: f32,
    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            underrun_policy: UnderrunPolicy::default(),
            gain: 1.0,
            event_capacity: 100,
        }
    }
}

impl SequencerOptions {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            underrun_policy: config.playback.underrun_policy,
            gain: config.output.gain,
            event_capacity: config.playback.event_capacity,
        }
    }
}

/// Handle to a running sequencer
///
/// Dropping every handle shuts the control task down as `destroy` would.
#[derive(Clone)]
pub struct Sequencer {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    events: EventBus,
}

impl Sequencer {
    /// Start the control task on the current tokio runtime
    ///
    /// Nothing is decoded and no output session is opened until `initialize`.
    pub fn spawn(
        decoder: Arc<dyn Decoder>,
        output: Arc<dyn OutputBackend>,
        options: SequencerOptions,
        notifications: Notifications,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (decode_tx, decode_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let events = EventBus::new(options.event_capacity);

        let fault_tx = internal_tx.clone();
        let engine = PlaybackEngine::new(
            output,
            options.gain,
            Arc::new(move |session, message| {
                let _ = fault_tx.send(Internal::OutputFault { session, message });
            }),
        );

        let controller = Controller {
            engine,
            preloader: Preloader::new(decoder, decode_tx),
            cache: BufferCache::new(),
            tracks: Vec::new(),
            cursor: 0,
            state: SequencerState::Uninitialized,
            active: None,
            awaiting_buffer: false,
            pending: None,
            policy: options.underrun_policy,
            notifier: Notifier::new(notifications, events.clone()),
            replies: Vec::new(),
            snapshot: snapshot_tx,
            internal: internal_tx,
            destroyed: false,
        };

        info!(
            "Sequencer started (underrun policy: {:?}, gain: {})",
            options.underrun_policy, options.gain
        );
        tokio::spawn(controller.run(command_rx, decode_rx, internal_rx));

        Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            events,
        }
    }

    /// Load a new track list, replacing the old one and resetting all state
    ///
    /// Returns once track 0 is decoded; track 1 keeps decoding in the
    /// background.
    pub async fn initialize(&self, sources: Vec<TrackSource>) -> Result<()> {
        self.call(|reply| Command::Initialize { sources, reply }).await
    }

    /// Start playing the track at the cursor from its beginning
    pub async fn play(&self) -> Result<()> {
        self.call(|reply| Command::Play { reply }).await
    }

    pub async fn pause(&self) {
        self.ack(|reply| Command::Pause { reply }).await
    }

    /// Pause and move the cursor back to 0
    pub async fn stop(&self) {
        self.ack(|reply| Command::Stop { reply }).await
    }

    /// Jump to track `index` and play it
    pub async fn play_track(&self, index: usize) -> Result<()> {
        self.call(|reply| Command::PlayTrack { index, reply }).await
    }

    /// Release the output session and end the control task. Idempotent.
    pub async fn destroy(&self) {
        self.ack(|reply| Command::Destroy { reply }).await
    }

    /// Play from the cursor until the list settles
    ///
    /// Calls `play` again whenever playback halts in `Paused` or `Ready`, as
    /// it does at an underrun under `UnderrunPolicy::Stop`; that `play` waits
    /// for the pending decode. Returns the settled state, `Stopped` at the end
    /// of the list or `Faulted` after an output fault.
    pub async fn play_to_end(&self) -> Result<SequencerState> {
        let mut snapshots = self.watch();
        self.play().await?;

        loop {
            let state = snapshots
                .wait_for(|s| s.state != SequencerState::Playing)
                .await
                .map(|s| s.state)
                .map_err(|_| Error::ShutDown)?;

            match state {
                SequencerState::Stopped | SequencerState::Faulted => return Ok(state),
                SequencerState::Uninitialized => return Err(Error::ShutDown),
                SequencerState::Ready | SequencerState::Paused => {
                    info!(
                        "Playback halted at track {}, resuming",
                        self.current_track_index()
                    );
                    self.play().await?;
                }
                SequencerState::Playing => unreachable!("wait_for excludes Playing"),
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot.borrow().is_playing()
    }

    pub fn current_track_index(&self) -> usize {
        self.snapshot.borrow().cursor
    }

    pub fn state(&self) -> SequencerState {
        self.snapshot.borrow().state
    }

    pub fn track_count(&self) -> usize {
        self.snapshot.borrow().track_count
    }

    pub fn snapshot(&self) -> Snapshot {
        *self.snapshot.borrow()
    }

    /// Receiver that wakes on every published snapshot
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.events.subscribe()
    }

    async fn call(&self, make: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::ShutDown)?;
        rx.await.unwrap_or(Err(Error::ShutDown))
    }

    /// Commands without a result are no-ops once the task is gone
    async fn ack(&self, make: impl FnOnce(Ack) -> Command) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(make(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Initialize,
    Play,
    PlayTrack { index: usize },
}

/// A request parked until a decode lands
struct Pending {
    kind: PendingKind,
    reply: Reply,
}

struct Controller {
    engine: PlaybackEngine,
    preloader: Preloader,
    cache: BufferCache,
    tracks: Vec<TrackSource>,
    cursor: usize,
    state: SequencerState,
    active: Option<PlaybackHandle>,
    awaiting_buffer: bool,
    pending: Option<Pending>,
    policy: UnderrunPolicy,
    notifier: Notifier,
    replies: Vec<Box<dyn FnOnce() + Send>>,
    snapshot: watch::Sender<Snapshot>,
    internal: mpsc::UnboundedSender<Internal>,
    destroyed: bool,
}

impl Controller {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut decodes: mpsc::UnboundedReceiver<DecodeOutcome>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All sequencer handles dropped");
                        self.shutdown();
                    }
                },
                Some(outcome) = decodes.recv() => self.handle_decode(outcome),
                Some(event) = internal.recv() => self.handle_internal(event),
            }

            self.commit();
            if self.destroyed {
                break;
            }
        }
        debug!("Sequencer control task exited");
    }

    /// Publish the snapshot, then notify, then answer callers
    fn commit(&mut self) {
        self.snapshot.send_replace(Snapshot {
            state: self.state,
            cursor: self.cursor,
            track_count: self.tracks.len(),
            awaiting_buffer: self.awaiting_buffer,
        });
        self.notifier.flush();
        for reply in self.replies.drain(..) {
            reply();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Initialize { sources, reply } => self.initialize(sources, reply),
            Command::Play { reply } => self.play(reply),
            Command::Pause { reply } => {
                self.pause();
                self.ack(reply);
            }
            Command::Stop { reply } => {
                self.stop();
                self.ack(reply);
            }
            Command::PlayTrack { index, reply } => self.play_track(index, reply),
            Command::Destroy { reply } => {
                self.shutdown();
                self.ack(reply);
            }
        }
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::TrackFinished { handle } => self.track_finished(handle),
            Internal::OutputFault { session, message } => {
                if !self.engine.has_session() || session != self.engine.session_id() {
                    debug!("Ignoring fault from closed output session {}", session);
                    return;
                }
                error!("Output device failed: {}", message);
                self.fault(Error::OutputUnavailable(message));
            }
        }
    }

    // ---- replies and notifications ----

    fn reply(&mut self, reply: Reply, result: Result<()>) {
        self.replies.push(Box::new(move || {
            let _ = reply.send(result);
        }));
    }

    fn ack(&mut self, reply: Ack) {
        self.replies.push(Box::new(move || {
            let _ = reply.send(());
        }));
    }

    fn set_state(&mut self, new: SequencerState) {
        let old = self.state;
        if old != new {
            info!("Sequencer state: {} -> {}", old, new);
            self.state = new;
            self.notifier.push(Note::StateChanged { old, new });
        }
    }

    fn track_changed(&mut self, index: usize) {
        self.notifier.push(Note::TrackChanged {
            index,
            track_count: self.tracks.len(),
        });
    }

    fn play_state_changed(&mut self, is_playing: bool) {
        self.notifier.push(Note::PlayStateChanged(is_playing));
    }

    fn fail(&mut self, index: Option<usize>, error: Error, fatal: bool) {
        if fatal {
            error!("Playback error: {}", error);
        } else {
            warn!("Playback error: {}", error);
        }
        self.notifier.push(Note::Failure {
            index,
            error,
            fatal,
        });
    }

    // ---- control surface ----

    fn initialize(&mut self, sources: Vec<TrackSource>, reply: Reply) {
        if sources.is_empty() {
            self.reply(reply, Err(Error::EmptyTrackList));
            return;
        }

        if let Some(pending) = self.pending.take() {
            self.reply(pending.reply, Err(Error::Cancelled));
        }
        self.silence();
        self.preloader.cancel_all();
        self.cache.clear();

        info!("Initializing with {} tracks", sources.len());
        self.tracks = sources;
        if self.cursor != 0 {
            self.cursor = 0;
            self.track_changed(0);
        }
        self.set_state(SequencerState::Uninitialized);

        if let Err(e) = self.engine.ensure_session() {
            self.fault(e.clone());
            self.reply(reply, Err(e));
            return;
        }

        self.preload(BufferSlot::Current, 0);
        if self.tracks.len() > 1 {
            self.preload(BufferSlot::Next, 1);
        }
        self.pending = Some(Pending {
            kind: PendingKind::Initialize,
            reply,
        });
    }

    fn play(&mut self, reply: Reply) {
        if !self.state.can_play() {
            let result = match self.state {
                SequencerState::Playing => Ok(()),
                _ => Err(Error::NotInitialized),
            };
            self.reply(reply, result);
            return;
        }

        self.supersede_pending();
        if self.align_current() {
            let result = self.start_current(true);
            self.reply(reply, result);
        } else {
            debug!("Play waiting for track {} to decode", self.cursor);
            self.pending = Some(Pending {
                kind: PendingKind::Play,
                reply,
            });
        }
    }

    fn pause(&mut self) {
        self.supersede_pending();
        if self.state == SequencerState::Playing {
            self.silence();
            self.set_state(SequencerState::Paused);
        }
    }

    fn stop(&mut self) {
        if matches!(
            self.state,
            SequencerState::Uninitialized | SequencerState::Faulted
        ) {
            return;
        }

        self.supersede_pending();
        self.silence();
        self.cursor = 0;
        self.set_state(SequencerState::Stopped);
        self.track_changed(0);
        self.rewind_cache();
    }

    fn play_track(&mut self, index: usize, reply: Reply) {
        if matches!(
            self.state,
            SequencerState::Uninitialized | SequencerState::Faulted
        ) {
            self.reply(reply, Err(Error::NotInitialized));
            return;
        }
        if index >= self.tracks.len() {
            let len = self.tracks.len();
            self.reply(reply, Err(Error::InvalidTrackIndex { index, len }));
            return;
        }

        self.supersede_pending();
        let was_playing = self.state == SequencerState::Playing;
        if let Some(handle) = self.active.take() {
            self.engine.stop(&handle);
        }

        if self.cache.holds(BufferSlot::Current, index) || self.cache.holds(BufferSlot::Next, index)
        {
            self.cursor = index;
            self.align_current();
            let result = self.start_current(true);
            self.reply(reply, result);
            return;
        }

        debug!("Track {} not cached, decoding before playback", index);
        if self.preloader.slot_for(index).is_none() {
            self.preload(BufferSlot::Current, index);
        }
        self.awaiting_buffer = was_playing;
        self.pending = Some(Pending {
            kind: PendingKind::PlayTrack { index },
            reply,
        });
    }

    fn shutdown(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(pending) = self.pending.take() {
            self.reply(pending.reply, Err(Error::ShutDown));
        }
        self.silence();
        self.preloader.cancel_all();
        self.cache.clear();
        self.engine.destroy();
        if self.cursor != 0 {
            self.cursor = 0;
            self.track_changed(0);
        }
        self.set_state(SequencerState::Uninitialized);
        self.destroyed = true;
        info!("Sequencer destroyed");
    }

    // ---- playback ----

    /// Stop the active voice; announce the play-state change if there was one
    fn silence(&mut self) {
        if let Some(handle) = self.active.take() {
            self.engine.stop(&handle);
        }
        self.awaiting_buffer = false;
        if self.state == SequencerState::Playing {
            self.play_state_changed(false);
        }
    }

    /// Schedule the cached track at the cursor
    ///
    /// `announce` fires track-changed for the cursor; it is false when the
    /// change was already announced at an underrun.
    fn start_current(&mut self, announce: bool) -> Result<()> {
        let buffer = match self.cache.current() {
            Some(track) if track.index == self.cursor => Arc::clone(&track.buffer),
            _ => return Err(Error::NoBufferReady),
        };

        if let Some(previous) = self.active.take() {
            previous.stop();
        }

        let mut handle = match self.engine.schedule(buffer) {
            Ok(handle) => handle,
            Err(e) => {
                self.fault(e.clone());
                return Err(e);
            }
        };
        let internal = self.internal.clone();
        handle.on_complete(move |id| {
            let _ = internal.send(Internal::TrackFinished { handle: id });
        });
        debug!("Playing track {} (handle {})", self.cursor, handle.id());
        self.active = Some(handle);
        self.awaiting_buffer = false;

        if self.state != SequencerState::Playing {
            self.set_state(SequencerState::Playing);
            self.play_state_changed(true);
        }
        if announce {
            self.track_changed(self.cursor);
        }
        self.ensure_next();
        Ok(())
    }

    fn track_finished(&mut self, handle: u64) {
        if self.active.as_ref().map(PlaybackHandle::id) != Some(handle) {
            debug!("Ignoring completion from superseded handle {}", handle);
            return;
        }
        self.active = None;

        let next = self.cursor + 1;
        if next >= self.tracks.len() {
            info!("Reached end of track list");
            self.finish_list();
            return;
        }

        self.cursor = next;
        if self.cache.holds(BufferSlot::Next, next) {
            self.align_current();
            // A schedule failure has already faulted the sequencer
            let _ = self.start_current(true);
            return;
        }

        warn!("Track {} not decoded at end of track {}", next, next - 1);
        self.track_changed(next);
        match self.policy {
            UnderrunPolicy::Wait => {
                self.awaiting_buffer = true;
                if self.align_current() {
                    let _ = self.start_current(false);
                }
            }
            UnderrunPolicy::Stop => {
                self.play_state_changed(false);
                self.set_state(SequencerState::Paused);
                self.align_current();
            }
        }
    }

    /// Settle after the last track, or after an underrun that cannot recover
    fn finish_list(&mut self) {
        let was_playing = self.state == SequencerState::Playing;
        if let Some(handle) = self.active.take() {
            handle.stop();
        }
        self.awaiting_buffer = false;
        self.cursor = 0;
        self.set_state(SequencerState::Stopped);
        self.track_changed(0);
        if was_playing {
            self.play_state_changed(false);
        }
        self.rewind_cache();
    }

    fn fault(&mut self, error: Error) {
        let was_playing = self.state == SequencerState::Playing;
        if let Some(handle) = self.active.take() {
            self.engine.stop(&handle);
        }
        self.engine.close_session();
        self.preloader.cancel_all();
        self.cache.clear();
        self.awaiting_buffer = false;
        if let Some(pending) = self.pending.take() {
            self.reply(pending.reply, Err(error.clone()));
        }
        if was_playing {
            self.play_state_changed(false);
        }
        self.set_state(SequencerState::Faulted);
        if self.cursor != 0 {
            self.cursor = 0;
            self.track_changed(0);
        }
        self.fail(None, error, true);
    }

    // ---- cache management ----

    fn preload(&mut self, slot: BufferSlot, index: usize) {
        let Some(source) = self.tracks.get(index) else {
            return;
        };
        let generation = self.cache.reserve(slot);
        self.preloader.spawn(slot, generation, index, source);
    }

    /// Make the current slot hold the cursor's track
    ///
    /// Returns true if it does now. Otherwise a decode for the cursor is in
    /// flight and `resume` finishes the job when it lands.
    fn align_current(&mut self) -> bool {
        let cursor = self.cursor;
        if self.cache.holds(BufferSlot::Current, cursor) {
            return true;
        }
        if self.cache.holds(BufferSlot::Next, cursor) {
            self.preloader.cancel(BufferSlot::Current);
            return self.cache.promote_next_to_current().is_ok();
        }
        if self.preloader.slot_for(cursor).is_none() {
            self.preload(BufferSlot::Current, cursor);
        }
        false
    }

    /// Preload the track after the cursor into the next slot
    fn ensure_next(&mut self) {
        if !self.cache.holds(BufferSlot::Current, self.cursor) {
            return;
        }
        let want = self.cursor + 1;
        if want >= self.tracks.len() {
            self.preloader.cancel(BufferSlot::Next);
            self.cache.discard(BufferSlot::Next);
            return;
        }
        if self.cache.holds(BufferSlot::Next, want)
            || self.preloader.in_flight(BufferSlot::Next) == Some(want)
        {
            return;
        }
        self.cache.discard(BufferSlot::Next);
        self.preload(BufferSlot::Next, want);
    }

    /// Bring the cache back towards the cursor after it moved to 0
    fn rewind_cache(&mut self) {
        let wanted = [self.cursor, self.cursor + 1];
        let next_index = self.cache.next().map(|t| t.index);
        if next_index.is_some_and(|i| !wanted.contains(&i)) {
            self.cache.discard(BufferSlot::Next);
        }
        if self
            .preloader
            .in_flight(BufferSlot::Next)
            .is_some_and(|i| !wanted.contains(&i))
        {
            self.preloader.cancel(BufferSlot::Next);
        }
        self.align_current();
        self.ensure_next();
    }

    /// Answer a parked play or play_track with `Cancelled`
    fn supersede_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        match pending.kind {
            PendingKind::Initialize => {
                self.pending = Some(pending);
            }
            PendingKind::Play => {
                self.reply(pending.reply, Err(Error::Cancelled));
            }
            PendingKind::PlayTrack { index } => {
                if self.preloader.in_flight(BufferSlot::Current) == Some(index)
                    && index != self.cursor
                {
                    self.preloader.cancel(BufferSlot::Current);
                }
                self.reply(pending.reply, Err(Error::Cancelled));
            }
        }
    }

    // ---- decode results ----

    fn handle_decode(&mut self, outcome: DecodeOutcome) {
        let DecodeOutcome {
            slot,
            generation,
            index,
            result,
        } = outcome;

        if !self.preloader.settle(slot, generation) || self.cache.generation(slot) != generation {
            debug!(%slot, generation, index, "Discarding superseded decode");
            return;
        }

        match result {
            Ok(buffer) => {
                let duration_ms = buffer.duration_ms();
                self.cache
                    .fulfil(slot, generation, CachedTrack::new(index, Arc::new(buffer)));
                debug!(%slot, index, duration_ms, "Track decoded");
                self.notifier.push(Note::BufferReady {
                    index,
                    slot,
                    duration_ms,
                });
                self.resume();
            }
            Err(e) => self.decode_failed(index, e),
        }
    }

    /// Continue whatever was waiting on a decode
    fn resume(&mut self) {
        if let Some(pending) = self.pending.take() {
            match pending.kind {
                PendingKind::Initialize => {
                    if self.cache.holds(BufferSlot::Current, 0) {
                        self.set_state(SequencerState::Ready);
                        self.reply(pending.reply, Ok(()));
                    } else {
                        self.pending = Some(pending);
                    }
                }
                PendingKind::Play => {
                    if self.align_current() {
                        let result = self.start_current(true);
                        self.reply(pending.reply, result);
                    } else {
                        self.pending = Some(pending);
                    }
                }
                PendingKind::PlayTrack { index } => {
                    if self.cache.holds(BufferSlot::Current, index)
                        || self.cache.holds(BufferSlot::Next, index)
                    {
                        self.cursor = index;
                        self.align_current();
                        let result = self.start_current(true);
                        self.reply(pending.reply, result);
                    } else {
                        self.pending = Some(pending);
                    }
                }
            }
            return;
        }

        if self.awaiting_buffer && self.state == SequencerState::Playing {
            if self.align_current() {
                info!("Track {} decoded, resuming after underrun", self.cursor);
                let _ = self.start_current(false);
            }
            return;
        }

        self.ensure_next();
    }

    fn decode_failed(&mut self, index: usize, source: DecodeError) {
        let error = Error::Decode { index, source };

        if let Some(pending) = self.pending.take() {
            match pending.kind {
                PendingKind::Initialize if index == 0 => {
                    self.preloader.cancel_all();
                    self.cache.clear();
                    self.set_state(SequencerState::Faulted);
                    self.fail(Some(index), error.clone(), true);
                    self.reply(pending.reply, Err(error));
                    return;
                }
                PendingKind::Play if index == self.cursor => {
                    self.fail(Some(index), error.clone(), false);
                    self.reply(pending.reply, Err(error));
                    return;
                }
                PendingKind::PlayTrack { index: wanted } if wanted == index => {
                    if self.state == SequencerState::Playing {
                        self.awaiting_buffer = false;
                        self.play_state_changed(false);
                        self.set_state(SequencerState::Paused);
                    }
                    self.fail(Some(index), error.clone(), false);
                    self.reply(pending.reply, Err(error));
                    return;
                }
                _ => self.pending = Some(pending),
            }
        }

        if self.awaiting_buffer && index == self.cursor {
            self.fail(Some(index), error, false);
            self.finish_list();
            return;
        }

        self.fail(Some(index), error, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = TomlConfig::default();
        config.output.gain = 0.5;
        config.playback.underrun_policy = UnderrunPolicy::Stop;
        config.playback.event_capacity = 16;

        let options = SequencerOptions::from_config(&config);
        assert_eq!(options.underrun_policy, UnderrunPolicy::Stop);
        assert_eq!(options.gain, 0.5);
        assert_eq!(options.event_capacity, 16);
    }

    #[test]
    fn test_default_options_wait_on_underrun() {
        let options = SequencerOptions::default();
        assert_eq!(options.underrun_policy, UnderrunPolicy::Wait);
        assert_eq!(options.gain, 1.0);
    }
}
