//! State published by the critical activity for the slower activities.
//!
//! Every field has a single writer. Readers may observe a mix of values from
//! two consecutive cycles, which is acceptable for display and logging.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, Ordering};

use atomic_float::AtomicF32;

use acsync_shared::{Mode, Status};

use crate::measurement::ControlSample;
use crate::recorder::Recorder;

/// Plain copy of the published values
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub mode: Mode,
    pub status: Status,
    pub duty_cycle: f32,
    pub v_ref: f32,
    pub i_ref: f32,
    pub sample: ControlSample,
}

#[derive(Default)]
struct AtomicSample {
    i1_low: AtomicF32,
    i2_low: AtomicF32,
    v1_low: AtomicF32,
    v2_low: AtomicF32,
    v_high: AtomicF32,
}

#[derive(Default)]
pub struct SharedState {
    // Written by the critical activity
    mode: AtomicU8,
    status: AtomicU8,
    duty_cycle: AtomicF32,
    v_ref: AtomicF32,
    i_ref: AtomicF32,
    sample: AtomicSample,
    cycle_time_margin_ns: AtomicI64,
    overruns: AtomicU64,
    tx_failures: AtomicU64,
    tx_failing: AtomicBool,

    // Written by the receive callback
    rx_dropped: AtomicU64,

    // Set by the console activity, cleared by the application activity
    downloading: AtomicBool,

    pub recorder: Recorder,
}

impl core::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedState")
            .field("snapshot", &self.snapshot())
            .field("recorder", &self.recorder)
            .finish()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the outcome of a control cycle
    pub fn publish(&self, t: &TelemetrySnapshot) {
        self.mode.store(u8::from(t.mode), Ordering::Relaxed);
        self.status.store(t.status.to_byte(), Ordering::Relaxed);
        self.duty_cycle.store(t.duty_cycle, Ordering::Relaxed);
        self.v_ref.store(t.v_ref, Ordering::Relaxed);
        self.i_ref.store(t.i_ref, Ordering::Relaxed);

        let s = &self.sample;
        s.i1_low.store(t.sample.i1_low, Ordering::Relaxed);
        s.i2_low.store(t.sample.i2_low, Ordering::Relaxed);
        s.v1_low.store(t.sample.v1_low, Ordering::Relaxed);
        s.v2_low.store(t.sample.v2_low, Ordering::Relaxed);
        s.v_high.store(t.sample.v_high, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let s = &self.sample;
        TelemetrySnapshot {
            mode: Mode::from(self.mode.load(Ordering::Relaxed)),
            status: Status::from_byte(self.status.load(Ordering::Relaxed)),
            duty_cycle: self.duty_cycle.load(Ordering::Relaxed),
            v_ref: self.v_ref.load(Ordering::Relaxed),
            i_ref: self.i_ref.load(Ordering::Relaxed),
            sample: ControlSample {
                i1_low: s.i1_low.load(Ordering::Relaxed),
                i2_low: s.i2_low.load(Ordering::Relaxed),
                v1_low: s.v1_low.load(Ordering::Relaxed),
                v2_low: s.v2_low.load(Ordering::Relaxed),
                v_high: s.v_high.load(Ordering::Relaxed),
            },
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from(self.mode.load(Ordering::Relaxed))
    }

    /// Record the outcome of a transmit.
    /// Returns true on the first failure after a success, so that a burst
    /// of failures is reported once.
    pub fn note_transmit(&self, ok: bool) -> bool {
        if !ok {
            self.tx_failures.fetch_add(1, Ordering::Relaxed);
        }
        let was_failing = self.tx_failing.swap(!ok, Ordering::Relaxed);
        !ok && !was_failing
    }

    pub fn tx_failures(&self) -> u64 {
        self.tx_failures.load(Ordering::Relaxed)
    }

    /// Count a received record that could not be queued
    pub fn note_rx_dropped(&self) {
        self.rx_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rx_dropped(&self) -> u64 {
        self.rx_dropped.load(Ordering::Relaxed)
    }

    pub fn note_cycle_margin(&self, margin_ns: i64) {
        self.cycle_time_margin_ns.store(margin_ns, Ordering::Relaxed);
        if margin_ns < 0 {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Time left before the deadline at the end of the last cycle
    pub fn cycle_time_margin_ns(&self) -> i64 {
        self.cycle_time_margin_ns.load(Ordering::Relaxed)
    }

    /// Cycles that finished after their deadline
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::Acquire)
    }

    pub fn set_downloading(&self, downloading: bool) {
        self.downloading.store(downloading, Ordering::Release);
    }
}
