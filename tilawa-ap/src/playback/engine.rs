//! Playback engine
//!
//! Wraps the output session. `schedule` turns a decoded buffer into a voice on
//! the session and returns a `PlaybackHandle` for that one playback instance.
//! The session is opened lazily on first use and released by `destroy`.

use crate::audio::{DecodedBuffer, FaultNotifier, OutputBackend, OutputSession, Voice};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Receives `(session_id, message)` when an open session's device fails
pub type SessionFaultHandler = Arc<dyn Fn(u64, String) + Send + Sync>;

/// Token for one playback instance
///
/// Completion fires at most once, and never after `stop`.
#[derive(Debug)]
pub struct PlaybackHandle {
    id: u64,
    stopped: Arc<AtomicBool>,
    done: Option<oneshot::Receiver<()>>,
}

impl PlaybackHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Invoke `callback(id)` when the voice reaches its natural end
    ///
    /// Only the first registration takes effect. The callback runs on a tokio
    /// task and is skipped if the handle was stopped before it could fire.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let Some(done) = self.done.take() else {
            warn!("Completion callback already registered for handle {}", self.id);
            return;
        };
        let id = self.id;
        let stopped = Arc::clone(&self.stopped);
        tokio::spawn(async move {
            if done.await.is_ok() && !stopped.load(Ordering::Acquire) {
                callback(id);
            }
        });
    }

    /// Halt audible output of this instance. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!("Playback handle {} stopped", self.id);
        }
    }
}

/// Owner of the output session and the voice id sequence
pub struct PlaybackEngine {
    backend: Arc<dyn OutputBackend>,
    on_fault: SessionFaultHandler,
    session: Option<Box<dyn OutputSession>>,
    session_id: u64,
    next_handle_id: u64,
    gain: f32,
    destroyed: bool,
}

impl PlaybackEngine {
    pub fn new(backend: Arc<dyn OutputBackend>, gain: f32, on_fault: SessionFaultHandler) -> Self {
        Self {
            backend,
            on_fault,
            session: None,
            session_id: 0,
            next_handle_id: 0,
            gain: gain.clamp(0.0, tilawa_common::config::MAX_GAIN),
            destroyed: false,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Id of the open session (ids start at 1; 0 means none was opened)
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Open the output session unless one is already open
    pub fn ensure_session(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(Error::ShutDown);
        }
        if self.session.is_some() {
            return Ok(());
        }

        let session_id = self.session_id + 1;
        let on_fault = Arc::clone(&self.on_fault);
        let notifier: FaultNotifier = Arc::new(move |message| on_fault(session_id, message));

        let session = self.backend.open(notifier)?;
        info!(
            "Output session {} opened at {}Hz",
            session_id,
            session.sample_rate()
        );
        self.session = Some(session);
        self.session_id = session_id;
        Ok(())
    }

    /// Begin audible output of `buffer` from its start
    ///
    /// Any voice already playing is replaced without completing.
    pub fn schedule(&mut self, buffer: Arc<DecodedBuffer>) -> Result<PlaybackHandle> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::OutputUnavailable("No output session".to_string()))?;

        self.next_handle_id += 1;
        let id = self.next_handle_id;
        let stopped = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = oneshot::channel();

        let frames = buffer.frame_count();
        session.start(Voice::new(id, buffer, self.gain, Arc::clone(&stopped), done_tx))?;
        debug!("Scheduled handle {} ({} frames)", id, frames);

        Ok(PlaybackHandle {
            id,
            stopped,
            done: Some(done_rx),
        })
    }

    /// Stop `handle` and silence the session
    pub fn stop(&mut self, handle: &PlaybackHandle) {
        handle.stop();
        if let Some(session) = self.session.as_mut() {
            session.halt();
        }
    }

    /// Drop the session after a device fault; a later `ensure_session` reopens
    pub fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            info!("Output session {} closed", self.session_id);
        }
    }

    /// Release the session for good. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.close_session();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}
