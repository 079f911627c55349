//! Two-slot decoded buffer cache
//!
//! Holds the "current" and "next" decoded tracks and nothing else, so memory
//! use is bounded by two buffers regardless of track-list length.
//!
//! Each slot carries a generation counter. Starting a decode for a slot takes
//! a fresh generation via `reserve`; the result is stored with `fulfil`, which
//! refuses it if the slot has been reserved, overwritten or cleared since.
//! This is what keeps a late-arriving stale decode from overwriting a newer
//! request.

use crate::audio::DecodedBuffer;
use crate::error::{Error, Result};
use std::sync::Arc;
use tilawa_common::events::BufferSlot;

/// Slot generation token
pub type Generation = u64;

/// A decoded buffer tagged with the track it belongs to
#[derive(Debug, Clone)]
pub struct CachedTrack {
    pub index: usize,
    pub buffer: Arc<DecodedBuffer>,
}

impl CachedTrack {
    pub fn new(index: usize, buffer: Arc<DecodedBuffer>) -> Self {
        Self { index, buffer }
    }
}

#[derive(Debug, Default)]
struct Slot {
    track: Option<CachedTrack>,
    generation: Generation,
}

impl Slot {
    fn bump(&mut self) -> Generation {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }
}

/// Current/next double buffer with per-slot generations
#[derive(Debug, Default)]
pub struct BufferCache {
    current: Slot,
    next: Slot,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, slot: BufferSlot) -> &Slot {
        match slot {
            BufferSlot::Current => &self.current,
            BufferSlot::Next => &self.next,
        }
    }

    fn slot_mut(&mut self, slot: BufferSlot) -> &mut Slot {
        match slot {
            BufferSlot::Current => &mut self.current,
            BufferSlot::Next => &mut self.next,
        }
    }

    pub fn current(&self) -> Option<&CachedTrack> {
        self.current.track.as_ref()
    }

    pub fn next(&self) -> Option<&CachedTrack> {
        self.next.track.as_ref()
    }

    pub fn get(&self, slot: BufferSlot) -> Option<&CachedTrack> {
        self.slot(slot).track.as_ref()
    }

    pub fn generation(&self, slot: BufferSlot) -> Generation {
        self.slot(slot).generation
    }

    /// Whether `slot` holds track `index`
    pub fn holds(&self, slot: BufferSlot, index: usize) -> bool {
        self.get(slot).map_or(false, |t| t.index == index)
    }

    /// Replace current, leaving next untouched. Returns the evicted track.
    pub fn set_current(&mut self, track: CachedTrack) -> Option<CachedTrack> {
        self.current.bump();
        self.current.track.replace(track)
    }

    /// Replace next, overwriting any stale value. Returns the evicted track.
    pub fn set_next(&mut self, track: CachedTrack) -> Option<CachedTrack> {
        self.next.bump();
        self.next.track.replace(track)
    }

    /// Move next into current and leave next empty
    ///
    /// Both generations advance, so decodes in flight for either slot can no
    /// longer land.
    pub fn promote_next_to_current(&mut self) -> Result<&CachedTrack> {
        let track = self.next.track.take().ok_or(Error::NoBufferReady)?;
        self.next.bump();
        self.current.bump();
        Ok(self.current.track.insert(track))
    }

    /// Start a new decode generation for `slot`
    ///
    /// The slot keeps its contents until the decode lands, so a failed decode
    /// leaves the cache as it was.
    pub fn reserve(&mut self, slot: BufferSlot) -> Generation {
        self.slot_mut(slot).bump()
    }

    /// Store a decode result if `generation` is still the slot's latest
    pub fn fulfil(&mut self, slot: BufferSlot, generation: Generation, track: CachedTrack) -> bool {
        let slot = self.slot_mut(slot);
        if slot.generation != generation {
            return false;
        }
        slot.track = Some(track);
        true
    }

    /// Empty one slot and invalidate its in-flight decode
    pub fn discard(&mut self, slot: BufferSlot) -> Option<CachedTrack> {
        let slot = self.slot_mut(slot);
        slot.bump();
        slot.track.take()
    }

    /// Empty both slots and invalidate all in-flight decodes
    pub fn clear(&mut self) {
        self.discard(BufferSlot::Current);
        self.discard(BufferSlot::Next);
    }

    /// Number of buffers held (never more than 2)
    pub fn len(&self) -> usize {
        usize::from(self.current.track.is_some()) + usize::from(self.next.track.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(index: usize) -> CachedTrack {
        CachedTrack::new(index, Arc::new(DecodedBuffer::new(vec![0.0; 2], 8000)))
    }

    #[test]
    fn test_set_current_leaves_next() {
        let mut cache = BufferCache::new();
        cache.set_next(track(1));
        assert!(cache.set_current(track(0)).is_none());

        assert!(cache.holds(BufferSlot::Current, 0));
        assert!(cache.holds(BufferSlot::Next, 1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_set_evicts_by_replacement() {
        let mut cache = BufferCache::new();
        cache.set_current(track(0));
        cache.set_next(track(1));
        let evicted = cache.set_next(track(2)).unwrap();

        assert_eq!(evicted.index, 1);
        assert!(cache.holds(BufferSlot::Next, 2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_promote_moves_next() {
        let mut cache = BufferCache::new();
        cache.set_current(track(0));
        cache.set_next(track(1));

        assert_eq!(cache.promote_next_to_current().unwrap().index, 1);
        assert!(cache.next().is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_promote_empty_next_fails() {
        let mut cache = BufferCache::new();
        cache.set_current(track(0));

        assert!(matches!(
            cache.promote_next_to_current(),
            Err(Error::NoBufferReady)
        ));
        assert!(cache.holds(BufferSlot::Current, 0));
    }

    #[test]
    fn test_stale_generation_refused() {
        let mut cache = BufferCache::new();
        let stale = cache.reserve(BufferSlot::Next);
        let fresh = cache.reserve(BufferSlot::Next);

        assert!(!cache.fulfil(BufferSlot::Next, stale, track(5)));
        assert!(cache.next().is_none());
        assert!(cache.fulfil(BufferSlot::Next, fresh, track(6)));
        assert!(cache.holds(BufferSlot::Next, 6));
    }

    #[test]
    fn test_reserve_keeps_contents() {
        let mut cache = BufferCache::new();
        cache.set_current(track(3));
        cache.reserve(BufferSlot::Current);
        assert!(cache.holds(BufferSlot::Current, 3));
    }

    #[test]
    fn test_direct_set_invalidates_in_flight() {
        let mut cache = BufferCache::new();
        let generation = cache.reserve(BufferSlot::Current);
        cache.set_current(track(1));
        assert!(!cache.fulfil(BufferSlot::Current, generation, track(9)));
        assert!(cache.holds(BufferSlot::Current, 1));
    }

    #[test]
    fn test_promote_invalidates_both_slots() {
        let mut cache = BufferCache::new();
        cache.set_next(track(1));
        let current_gen = cache.reserve(BufferSlot::Current);
        let next_gen = cache.reserve(BufferSlot::Next);
        cache.promote_next_to_current().unwrap();

        assert!(!cache.fulfil(BufferSlot::Current, current_gen, track(7)));
        assert!(!cache.fulfil(BufferSlot::Next, next_gen, track(8)));
    }

    #[test]
    fn test_clear() {
        let mut cache = BufferCache::new();
        cache.set_current(track(0));
        cache.set_next(track(1));
        let generation = cache.generation(BufferSlot::Current);
        cache.clear();

        assert!(cache.is_empty());
        assert!(!cache.fulfil(BufferSlot::Current, generation, track(0)));
    }

    #[test]
    fn test_never_more_than_two() {
        let mut cache = BufferCache::new();
        for i in 0..50 {
            if i % 3 == 0 {
                cache.set_current(track(i));
            } else {
                cache.set_next(track(i));
            }
            if i % 7 == 0 {
                let _ = cache.promote_next_to_current();
            }
            assert!(cache.len() <= 2);
        }
    }
}
