//! Background decode tasks
//!
//! At most one decode per cache slot is in flight. Starting a decode for a
//! slot aborts the task already running there. Every result is posted to the
//! control loop tagged with `(slot, generation, index)`; the loop settles it
//! against the preloader and the cache and drops anything superseded.

use super::cache::Generation;
use crate::audio::{DecodedBuffer, Decoder, TrackSource};
use crate::error::DecodeError;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tilawa_common::events::BufferSlot;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Result of one background decode
#[derive(Debug)]
pub struct DecodeOutcome {
    pub slot: BufferSlot,
    pub generation: Generation,
    pub index: usize,
    pub result: Result<DecodedBuffer, DecodeError>,
}

#[derive(Debug)]
struct InFlight {
    index: usize,
    generation: Generation,
    abort: AbortHandle,
}

/// Spawns and tracks the per-slot decode tasks
pub struct Preloader {
    decoder: Arc<dyn Decoder>,
    results: UnboundedSender<DecodeOutcome>,
    current: Option<InFlight>,
    next: Option<InFlight>,
}

impl Preloader {
    pub fn new(decoder: Arc<dyn Decoder>, results: UnboundedSender<DecodeOutcome>) -> Self {
        Self {
            decoder,
            results,
            current: None,
            next: None,
        }
    }

    fn entry(&mut self, slot: BufferSlot) -> &mut Option<InFlight> {
        match slot {
            BufferSlot::Current => &mut self.current,
            BufferSlot::Next => &mut self.next,
        }
    }

    /// Decode track `index` into `slot` under `generation`
    pub fn spawn(
        &mut self,
        slot: BufferSlot,
        generation: Generation,
        index: usize,
        source: &TrackSource,
    ) {
        self.cancel(slot);

        let decode = self.decoder.decode(source);
        let results = self.results.clone();
        let label = source.to_string();
        debug!(%slot, generation, index, source = %label, "Starting decode");

        let task = tokio::spawn(async move {
            let result = match AssertUnwindSafe(decode).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    warn!(index, source = %label, "Decoder panicked");
                    Err(DecodeError::Codec("decoder panicked".to_string()))
                }
            };
            // The control loop may already be gone
            let _ = results.send(DecodeOutcome {
                slot,
                generation,
                index,
                result,
            });
        });

        *self.entry(slot) = Some(InFlight {
            index,
            generation,
            abort: task.abort_handle(),
        });
    }

    /// Track index being decoded into `slot`, if any
    pub fn in_flight(&self, slot: BufferSlot) -> Option<usize> {
        let entry = match slot {
            BufferSlot::Current => &self.current,
            BufferSlot::Next => &self.next,
        };
        entry.as_ref().map(|f| f.index)
    }

    /// Slot decoding track `index`, if any
    pub fn slot_for(&self, index: usize) -> Option<BufferSlot> {
        [BufferSlot::Current, BufferSlot::Next]
            .into_iter()
            .find(|&slot| self.in_flight(slot) == Some(index))
    }

    /// Mark the decode for `(slot, generation)` finished
    ///
    /// Returns false when the outcome belongs to a task that has since been
    /// cancelled or replaced.
    pub fn settle(&mut self, slot: BufferSlot, generation: Generation) -> bool {
        let entry = self.entry(slot);
        match entry {
            Some(f) if f.generation == generation => {
                *entry = None;
                true
            }
            _ => false,
        }
    }

    /// Abort the decode running for `slot`
    pub fn cancel(&mut self, slot: BufferSlot) {
        if let Some(f) = self.entry(slot).take() {
            f.abort.abort();
            debug!(%slot, index = f.index, "Cancelled decode");
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel(BufferSlot::Current);
        self.cancel(BufferSlot::Next);
    }
}

impl Drop for Preloader {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
