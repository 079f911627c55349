//! Headless output
//!
//! Plays nothing audible. In manual mode a `VirtualController` decides when
//! the active voice finishes, which makes natural completion deterministic in
//! tests. In realtime mode a voice finishes after its buffer's duration, which
//! lets the CLI run without an audio device.

use super::{FaultNotifier, OutputBackend, OutputSession, Voice};
use crate::audio::types::DecodedBuffer;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clock {
    Manual,
    Realtime,
}

#[derive(Default)]
struct Inner {
    active: Option<Voice>,
    fault: Option<FaultNotifier>,
    fail_next_open: Option<String>,
    open: bool,
    opens: usize,
    closes: usize,
    halts: usize,
    started: Vec<Arc<DecodedBuffer>>,
}

#[derive(Default)]
struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the active voice if it is still `id`
    fn take_if(&self, id: u64) -> Option<Voice> {
        let mut inner = self.lock();
        if inner.active.as_ref().map(Voice::id) == Some(id) {
            inner.active.take()
        } else {
            None
        }
    }
}

/// Output backend without a device
#[derive(Clone)]
pub struct VirtualOutput {
    clock: Clock,
    sample_rate: u32,
    shared: Arc<Shared>,
}

impl VirtualOutput {
    /// Voices finish only when the controller says so
    pub fn manual(sample_rate: u32) -> Self {
        Self {
            clock: Clock::Manual,
            sample_rate,
            shared: Arc::default(),
        }
    }

    /// Voices finish after their buffer's duration
    pub fn realtime(sample_rate: u32) -> Self {
        Self {
            clock: Clock::Realtime,
            ..Self::manual(sample_rate)
        }
    }

    pub fn controller(&self) -> VirtualController {
        VirtualController {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl OutputBackend for VirtualOutput {
    fn open(&self, on_fault: FaultNotifier) -> Result<Box<dyn OutputSession>> {
        let mut inner = self.shared.lock();
        if let Some(message) = inner.fail_next_open.take() {
            return Err(Error::OutputUnavailable(message));
        }
        inner.opens += 1;
        inner.open = true;
        inner.fault = Some(on_fault);
        debug!("Virtual output opened ({:?} clock)", self.clock);

        Ok(Box::new(VirtualSession {
            clock: self.clock,
            sample_rate: self.sample_rate,
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }
}

struct VirtualSession {
    clock: Clock,
    sample_rate: u32,
    shared: Arc<Shared>,
    closed: bool,
}

impl OutputSession for VirtualSession {
    fn start(&mut self, mut voice: Voice) -> Result<()> {
        if self.closed {
            return Err(Error::OutputUnavailable("Output session closed".to_string()));
        }
        voice.set_output_rate(self.sample_rate);
        let id = voice.id();
        let duration = voice.buffer().duration();

        let previous = {
            let mut inner = self.shared.lock();
            inner.started.push(Arc::clone(voice.buffer()));
            inner.active.replace(voice)
        };
        drop(previous);

        if self.clock == Clock::Realtime {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let shared = Arc::clone(&self.shared);
                    handle.spawn(async move {
                        tokio::time::sleep(duration).await;
                        if let Some(voice) = shared.take_if(id) {
                            voice.complete();
                        }
                    });
                }
                Err(_) => warn!("No async runtime, virtual voice {} will not finish", id),
            }
        }
        Ok(())
    }

    fn halt(&mut self) {
        let previous = {
            let mut inner = self.shared.lock();
            inner.halts += 1;
            inner.active.take()
        };
        drop(previous);
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let previous = {
            let mut inner = self.shared.lock();
            inner.open = false;
            inner.closes += 1;
            inner.fault = None;
            inner.active.take()
        };
        drop(previous);
        debug!("Virtual output closed");
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for VirtualSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Test-side handle onto a `VirtualOutput`
#[derive(Clone)]
pub struct VirtualController {
    shared: Arc<Shared>,
}

impl VirtualController {
    /// Play the active voice to its end. Returns false if nothing was playing.
    pub fn finish_active(&self) -> bool {
        let voice = self.shared.lock().active.take();
        match voice {
            Some(voice) => {
                voice.complete();
                true
            }
            None => false,
        }
    }

    /// Buffer of the voice currently sounding
    pub fn active_buffer(&self) -> Option<Arc<DecodedBuffer>> {
        self.shared
            .lock()
            .active
            .as_ref()
            .map(|v| Arc::clone(v.buffer()))
    }

    pub fn active_voice_id(&self) -> Option<u64> {
        self.shared.lock().active.as_ref().map(Voice::id)
    }

    /// Gain of the voice currently sounding
    pub fn active_gain(&self) -> Option<f32> {
        self.shared.lock().active.as_ref().map(Voice::gain)
    }

    /// Every buffer ever started, in order
    pub fn started(&self) -> Vec<Arc<DecodedBuffer>> {
        self.shared.lock().started.clone()
    }

    pub fn open_count(&self) -> usize {
        self.shared.lock().opens
    }

    pub fn close_count(&self) -> usize {
        self.shared.lock().closes
    }

    pub fn halt_count(&self) -> usize {
        self.shared.lock().halts
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Make the next `open` fail with `OutputUnavailable(message)`
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.shared.lock().fail_next_open = Some(message.into());
    }

    /// Report a device failure as the real device callback would
    pub fn inject_fault(&self, message: impl Into<String>) -> bool {
        let notifier = self.shared.lock().fault.clone();
        match notifier {
            Some(notify) => {
                notify(message.into());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn voice(id: u64, frames: usize) -> (Voice, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let buffer = Arc::new(DecodedBuffer::new(vec![0.0; frames * 2], 1000));
        (
            Voice::new(id, buffer, 1.0, Arc::new(AtomicBool::new(false)), tx),
            rx,
        )
    }

    fn no_fault() -> FaultNotifier {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn test_manual_finish_completes_voice() {
        let output = VirtualOutput::manual(1000);
        let controller = output.controller();
        let mut session = output.open(no_fault()).unwrap();

        let (v, rx) = voice(1, 10);
        session.start(v).unwrap();
        assert_eq!(controller.active_voice_id(), Some(1));

        assert!(controller.finish_active());
        assert!(rx.await.is_ok());
        assert!(!controller.finish_active());
    }

    #[tokio::test]
    async fn test_replaced_voice_never_completes() {
        let output = VirtualOutput::manual(1000);
        let mut session = output.open(no_fault()).unwrap();

        let (first, first_rx) = voice(1, 10);
        let (second, _second_rx) = voice(2, 10);
        session.start(first).unwrap();
        session.start(second).unwrap();

        assert!(first_rx.await.is_err());
        assert_eq!(output.controller().started().len(), 2);
    }

    #[tokio::test]
    async fn test_halt_and_close() {
        let output = VirtualOutput::manual(1000);
        let controller = output.controller();
        let mut session = output.open(no_fault()).unwrap();

        let (v, rx) = voice(1, 10);
        session.start(v).unwrap();
        session.halt();
        assert!(rx.await.is_err());
        assert_eq!(controller.halt_count(), 1);

        session.close();
        session.close();
        assert_eq!(controller.close_count(), 1);
        assert!(!controller.is_open());

        let (v, _rx) = voice(2, 10);
        assert!(session.start(v).is_err());
    }

    #[tokio::test]
    async fn test_realtime_clock_finishes_after_duration() {
        let output = VirtualOutput::realtime(1000);
        let mut session = output.open(no_fault()).unwrap();

        // 20 frames at 1kHz
        let (v, rx) = voice(1, 20);
        session.start(v).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), rx).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[test]
    fn test_fail_next_open() {
        let output = VirtualOutput::manual(1000);
        let controller = output.controller();
        controller.fail_next_open("no device");

        assert!(matches!(
            output.open(no_fault()),
            Err(Error::OutputUnavailable(_))
        ));
        assert!(output.open(no_fault()).is_ok());
        assert_eq!(controller.open_count(), 1);
    }

    #[test]
    fn test_inject_fault_reaches_notifier() {
        let output = VirtualOutput::manual(1000);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _session = output
            .open(Arc::new(move |msg| sink.lock().unwrap().push(msg)))
            .unwrap();

        assert!(output.controller().inject_fault("device unplugged"));
        assert_eq!(seen.lock().unwrap().as_slice(), ["device unplugged".to_string()]);
    }
}
