//! Audio output
//!
//! An `OutputBackend` opens at most one `OutputSession` per sequencer. The
//! session plays one `Voice` at a time: starting a voice replaces the previous
//! one, halting drops it. A voice that plays to its last frame reports
//! completion through a oneshot channel; a voice that is stopped or dropped
//! never does.
//!
//! The successor voice is started by the control task after it receives that
//! completion, so the rest of the device buffer in which a voice ends is
//! filled with silence. Each transition therefore carries up to one callback
//! period (`output.buffer_size` frames) plus task wake-up latency of silence.
//! Gapless here means no decode or fetch stall between tracks, not
//! sample-accurate splicing.

mod cpal_output;
mod virtual_output;

pub use cpal_output::CpalOutput;
pub use virtual_output::{VirtualController, VirtualOutput};

use crate::audio::types::{AudioFrame, DecodedBuffer};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Called by a session when the device fails after it was opened
pub type FaultNotifier = Arc<dyn Fn(String) + Send + Sync>;

/// Factory for the live output connection
pub trait OutputBackend: Send + Sync {
    /// Open the device. Runtime failures are reported through `on_fault`.
    fn open(&self, on_fault: FaultNotifier) -> Result<Box<dyn OutputSession>>;
}

/// A live output connection playing at most one voice
///
/// When a voice runs out mid-callback the remaining frames are silence until
/// the next `start`.
pub trait OutputSession: Send {
    /// Begin audible output of `voice`, replacing any voice already playing
    fn start(&mut self, voice: Voice) -> Result<()>;

    /// Silence and drop the playing voice, if any
    fn halt(&mut self);

    /// Release the device; further calls are no-ops
    fn close(&mut self);

    /// Device sample rate in Hz
    fn sample_rate(&self) -> u32;
}

/// One playback instance of a decoded buffer
///
/// Owned by the session while it plays. `next_frame` walks the buffer at the
/// device rate; when the buffer runs out the session calls `complete`.
pub struct Voice {
    id: u64,
    buffer: Arc<DecodedBuffer>,
    gain: f32,
    cursor: f64,
    step: f64,
    stopped: Arc<AtomicBool>,
    done: Option<oneshot::Sender<()>>,
}

impl Voice {
    pub fn new(
        id: u64,
        buffer: Arc<DecodedBuffer>,
        gain: f32,
        stopped: Arc<AtomicBool>,
        done: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            buffer,
            gain,
            cursor: 0.0,
            step: 1.0,
            stopped,
            done: Some(done),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn buffer(&self) -> &Arc<DecodedBuffer> {
        &self.buffer
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Adapt playback speed when the device rate differs from the buffer rate
    pub fn set_output_rate(&mut self, output_rate: u32) {
        let buffer_rate = self.buffer.sample_rate();
        self.step = if output_rate == 0 || buffer_rate == output_rate {
            1.0
        } else {
            buffer_rate as f64 / output_rate as f64
        };
    }

    /// Next gain-scaled frame, or `None` once the buffer is exhausted
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.is_stopped() {
            return None;
        }
        let index = self.cursor as usize;
        let frame = self.buffer.frame(index)?;

        let frame = if self.step == 1.0 {
            frame
        } else {
            // Linear interpolation between neighbouring frames
            let frac = (self.cursor - index as f64) as f32;
            let next = self.buffer.frame(index + 1).unwrap_or(frame);
            AudioFrame {
                left: frame.left + (next.left - frame.left) * frac,
                right: frame.right + (next.right - frame.right) * frac,
            }
        };

        self.cursor += self.step;
        Some(frame.with_gain(self.gain))
    }

    /// Report natural completion, unless the voice was stopped first
    pub fn complete(mut self) {
        if let Some(done) = self.done.take() {
            if !self.is_stopped() {
                let _ = done.send(());
            }
        }
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("frames", &self.buffer.frame_count())
            .field("cursor", &self.cursor)
            .field("gain", &self.gain)
            .finish()
    }
}

/// Fill an interleaved device buffer from `voice`
///
/// Returns true when the voice ran out during this call. Channels beyond the
/// first two are silenced; a mono device gets the average of left and right.
pub(crate) fn render_frames(voice: &mut Option<Voice>, channels: usize, data: &mut [f32]) -> bool {
    let mut finished = false;
    for frame in data.chunks_mut(channels.max(1)) {
        let audio = match voice.as_mut().and_then(Voice::next_frame) {
            Some(audio) => audio,
            None => {
                if voice.is_some() {
                    finished = true;
                }
                AudioFrame::zero()
            }
        };
        write_frame(frame, audio);
    }
    finished
}

/// Write one stereo frame to a device frame of any width
fn write_frame(frame: &mut [f32], audio: AudioFrame) {
    match frame {
        [mono] => *mono = (audio.left + audio.right) * 0.5,
        [left, right, rest @ ..] => {
            *left = audio.left;
            *right = audio.right;
            rest.iter_mut().for_each(|s| *s = 0.0);
        }
        [] => {}
    }
}
