//! Decoder test double
//!
//! Sources are named `track-{i}`; track `i` decodes to a buffer of
//! `BASE_FRAMES + i` frames, so the buffer a voice is playing tells a test
//! which track it is. Individual tracks can be made to fail or to block on
//! a gate until the test opens it.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tilawa_ap::audio::{DecodedBuffer, Decoder, TrackSource};
use tilawa_ap::DecodeError;
use tokio::sync::Semaphore;

/// Frame count of track 0; track `i` has `BASE_FRAMES + i` frames
pub const BASE_FRAMES: usize = 100;

/// Sample rate of every scripted buffer
pub const SCRIPTED_RATE: u32 = 1000;

/// Track list `track-0 .. track-{n-1}`
pub fn tracks(n: usize) -> Vec<TrackSource> {
    (0..n)
        .map(|i| TrackSource::File(PathBuf::from(format!("track-{}.mp3", i))))
        .collect()
}

/// Which track a buffer was decoded from
pub fn track_of(buffer: &DecodedBuffer) -> usize {
    buffer.frame_count() - BASE_FRAMES
}

fn name_of(source: &TrackSource) -> String {
    match source {
        TrackSource::File(path) => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        TrackSource::Url(url) => url.to_string(),
    }
}

fn index_of(name: &str) -> usize {
    name.strip_prefix("track-")
        .and_then(|i| i.parse().ok())
        .unwrap_or(0)
}

#[derive(Default)]
struct Script {
    failures: HashMap<String, usize>,
    gates: HashMap<String, Arc<Semaphore>>,
    calls: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedDecoder {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every decode of `track-{index}` fails
    pub fn fail(&self, index: usize) {
        self.fail_times(index, usize::MAX);
    }

    /// The next `times` decodes of `track-{index}` fail
    pub fn fail_times(&self, index: usize, times: usize) {
        self.script
            .lock()
            .unwrap()
            .failures
            .insert(format!("track-{}", index), times);
    }

    /// Decodes of `track-{index}` block until `open` is called
    pub fn gate(&self, index: usize) {
        self.script
            .lock()
            .unwrap()
            .gates
            .insert(format!("track-{}", index), Arc::new(Semaphore::new(0)));
    }

    /// Let one blocked decode of `track-{index}` proceed
    pub fn open(&self, index: usize) {
        if let Some(gate) = self.script.lock().unwrap().gates.get(&format!("track-{}", index)) {
            gate.add_permits(1);
        }
    }

    /// Track indices in the order decodes were requested
    pub fn calls(&self) -> Vec<usize> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|name| index_of(name))
            .collect()
    }

    pub fn call_count(&self, index: usize) -> usize {
        self.calls().into_iter().filter(|&i| i == index).count()
    }

    /// Largest number of decodes that were ever running at once
    pub fn max_in_flight(&self) -> usize {
        self.script.lock().unwrap().max_in_flight
    }
}

/// Decrements the in-flight count even when the decode task is aborted
struct InFlightGuard(Arc<Mutex<Script>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.lock().unwrap().in_flight -= 1;
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(&self, source: &TrackSource) -> BoxFuture<'static, Result<DecodedBuffer, DecodeError>> {
        let name = name_of(source);
        let (gate, fails) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(name.clone());
            script.in_flight += 1;
            script.max_in_flight = script.max_in_flight.max(script.in_flight);

            let fails = match script.failures.get_mut(&name) {
                Some(remaining) if *remaining > 0 => {
                    *remaining = remaining.saturating_sub(1);
                    true
                }
                _ => false,
            };
            (script.gates.get(&name).cloned(), fails)
        };
        let guard = InFlightGuard(Arc::clone(&self.script));

        Box::pin(async move {
            let _guard = guard;
            if let Some(gate) = gate {
                match gate.acquire_owned().await {
                    Ok(permit) => permit.forget(),
                    Err(_) => return Err(DecodeError::Fetch("gate closed".to_string())),
                }
            }
            if fails {
                return Err(DecodeError::Fetch(format!("scripted failure for {}", name)));
            }
            let frames = BASE_FRAMES + index_of(&name);
            Ok(DecodedBuffer::new(vec![0.25; frames * 2], SCRIPTED_RATE))
        })
    }
}
