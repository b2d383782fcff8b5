//! Fixed-capacity telemetry recorder.
//!
//! Records are stored as 32-bit words in atomics so that the critical
//! activity can write while the application activity dumps, without either
//! side taking a lock. The write cursor saturates at the last slot: once
//! full, every new record overwrites that slot until [`Recorder::reset`].

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use acsync_shared::{NB_CURVES, RECORD_SIZE, Record};

pub struct Recorder {
    words: Box<[AtomicU32]>,
    cursor: AtomicUsize,
    capacity: usize,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::with_capacity(RECORD_SIZE)
    }
}

impl core::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Recorder")
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor())
            .finish()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    /// If `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "Recorder capacity must be > 0");
        let words = (0..capacity * NB_CURVES)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            words,
            cursor: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot that the next record will be written to
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Write at the cursor and advance it, stopping at the last slot.
    ///
    /// Single writer only.
    pub fn record(&self, rec: &Record) {
        let at = self.cursor.load(Ordering::Relaxed);
        let base = at * NB_CURVES;
        for (slot, w) in self.words[base..base + NB_CURVES]
            .iter()
            .zip(rec.to_words())
        {
            slot.store(w, Ordering::Relaxed);
        }

        let next = if at < self.capacity - 1 { at + 1 } else { at };
        self.cursor.store(next, Ordering::Release);
    }

    /// Restart recording from the first slot. Stored data is kept until overwritten.
    pub fn reset(&self) {
        self.cursor.store(0, Ordering::Release);
    }

    /// Every stored word in storage order, one at a time.
    /// Does not clear the buffer.
    pub fn words(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().map(|w| w.load(Ordering::Relaxed))
    }

    /// Read one record
    pub fn get(&self, index: usize) -> Option<Record> {
        if index >= self.capacity {
            return None;
        }
        let base = index * NB_CURVES;
        let mut w = [0_u32; NB_CURVES];
        for (dst, src) in w.iter_mut().zip(&self.words[base..base + NB_CURVES]) {
            *dst = src.load(Ordering::Relaxed);
        }
        Some(Record::from_words(&w))
    }

    /// Every slot, in storage order
    pub fn drain(&self) -> Vec<Record> {
        (0..self.capacity).filter_map(|i| self.get(i)).collect()
    }
}
