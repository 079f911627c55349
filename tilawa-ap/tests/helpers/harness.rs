//! Sequencer wired to a scripted decoder and a manual virtual output

use super::scripted_decoder::{track_of, ScriptedDecoder, SCRIPTED_RATE};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tilawa_ap::audio::{VirtualController, VirtualOutput};
use tilawa_ap::{
    Notifications, Sequencer, SequencerEvent, SequencerOptions, Snapshot, UnderrunPolicy,
};
use tokio::sync::broadcast;

/// How long a test waits for the control task before failing
pub const WAIT: Duration = Duration::from_secs(2);

/// One callback invocation, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Track(usize),
    Playing(bool),
    Error(String),
}

pub struct Harness {
    pub sequencer: Sequencer,
    pub output: VirtualController,
    pub decoder: ScriptedDecoder,
    notices: Arc<Mutex<Vec<Notice>>>,
    events: broadcast::Receiver<SequencerEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(ScriptedDecoder::new(), SequencerOptions::default())
    }

    pub fn with_policy(policy: UnderrunPolicy) -> Self {
        Self::with_options(
            ScriptedDecoder::new(),
            SequencerOptions {
                underrun_policy: policy,
                ..SequencerOptions::default()
            },
        )
    }

    pub fn with_options(decoder: ScriptedDecoder, options: SequencerOptions) -> Self {
        let output = VirtualOutput::manual(SCRIPTED_RATE);
        let notices = Arc::new(Mutex::new(Vec::new()));

        let (t, p, e) = (
            Arc::clone(&notices),
            Arc::clone(&notices),
            Arc::clone(&notices),
        );
        let notifications = Notifications::new()
            .on_track_changed(move |i| t.lock().unwrap().push(Notice::Track(i)))
            .on_play_state_changed(move |b| p.lock().unwrap().push(Notice::Playing(b)))
            .on_error(move |err| e.lock().unwrap().push(Notice::Error(err.to_string())));

        let sequencer = Sequencer::spawn(
            Arc::new(decoder.clone()),
            Arc::new(output.clone()),
            options,
            notifications,
        );
        let events = sequencer.subscribe();

        Self {
            sequencer,
            output: output.controller(),
            decoder,
            notices,
            events,
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    /// Return and forget the notices seen so far
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap())
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Error(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    /// Track whose buffer is sounding right now
    pub fn playing_track(&self) -> Option<usize> {
        self.output.active_buffer().map(|b| track_of(&b))
    }

    /// Tracks in the order they were started on the output
    pub fn started_tracks(&self) -> Vec<usize> {
        self.output.started().iter().map(|b| track_of(b)).collect()
    }

    /// Wait until a published snapshot satisfies `pred`
    pub async fn wait_for(&self, mut pred: impl FnMut(&Snapshot) -> bool) -> Snapshot {
        let mut rx = self.sequencer.watch();
        let snapshot = tokio::time::timeout(WAIT, rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for sequencer state")
            .expect("sequencer task exited");
        *snapshot
    }

    /// Wait for the buffer of track `index` to land in the cache
    pub async fn buffer_ready(&mut self, index: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let event = tokio::time::timeout_at(deadline, self.events.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for track {} to decode", index));
            match event {
                Ok(SequencerEvent::BufferReady { index: i, .. }) if i == index => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    }

    /// Poll the recorded callbacks until one satisfies `pred`
    pub async fn wait_for_notice(&self, mut pred: impl FnMut(&Notice) -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !self.notices().iter().any(&mut pred) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for notification"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Let the sounding track reach its natural end
    pub fn finish_track(&self) {
        assert!(self.output.finish_active(), "no track was playing");
    }

    /// Finish the sounding track and wait for the cursor to reach `index`
    /// with a voice sounding
    pub async fn advance_to(&self, index: usize) {
        self.finish_track();
        self.wait_for(|s| s.cursor == index && s.is_playing() && !s.awaiting_buffer)
            .await;
        assert_eq!(self.playing_track(), Some(index));
    }

    /// Yield long enough for stray tasks to run
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
}
