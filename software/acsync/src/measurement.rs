//! Per-cycle measurement snapshot with freeze-on-bad-sample filtering.

use acsync_shared::channel::in_range;

use crate::peripheral::{Acquisition, Channel};

/// Latest accepted value of every measured channel
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlSample {
    pub i1_low: f32,
    pub i2_low: f32,
    pub v1_low: f32,
    pub v2_low: f32,
    pub v_high: f32,
}

impl ControlSample {
    fn slot(&mut self, channel: Channel) -> &mut f32 {
        match channel {
            Channel::I1Low => &mut self.i1_low,
            Channel::I2Low => &mut self.i2_low,
            Channel::V1Low => &mut self.v1_low,
            Channel::V2Low => &mut self.v2_low,
            Channel::VHigh => &mut self.v_high,
        }
    }

    /// Differential low-side voltage
    pub fn v_low_diff(&self) -> f32 {
        self.v1_low - self.v2_low
    }
}

/// Holds the last good reading of each channel.
///
/// A reading outside `(-MEAS_LIMIT, MEAS_LIMIT)`, the no-sample sentinel,
/// or NaN leaves the previous value in place.
#[derive(Clone, Debug, Default)]
pub struct Measurements {
    sample: ControlSample,
    rejected: u64,
}

impl Measurements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer one raw reading. Returns whether it was accepted.
    pub fn update(&mut self, channel: Channel, raw: f32) -> bool {
        if in_range(raw) {
            *self.sample.slot(channel) = raw;
            true
        } else {
            self.rejected += 1;
            false
        }
    }

    /// Read every channel once
    pub fn acquire(&mut self, acq: &mut dyn Acquisition) -> &ControlSample {
        for channel in Channel::ALL {
            let raw = acq.get_latest(channel);
            self.update(channel, raw);
        }
        &self.sample
    }

    pub fn latest(&self) -> &ControlSample {
        &self.sample
    }

    /// Total readings discarded since creation
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
