//! Layout of the decimated telemetry recorder, as dumped word by word.

use byte_struct::*;
pub use byte_struct::{ByteStruct, ByteStructLen};

/// Number of records held by the recorder
pub const RECORD_SIZE: usize = 2048;

/// Number of 32-bit words per record
pub const NB_CURVES: usize = 7;

/// One recorder entry.
///
/// The last slot holds the phase angle on the voltage source and the
/// current-loop correction on the current follower.
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq)]
#[byte_struct_le]
pub struct Record {
    pub i_low: f32,
    pub v_low: f32,
    pub v_high: f32,
    pub i_ref: f32,
    pub duty_cycle: f32,
    pub v_ref: f32,
    pub angle_or_correction: f32,
}

impl Record {
    /// Words in dump order
    pub fn to_words(&self) -> [u32; NB_CURVES] {
        [
            self.i_low.to_bits(),
            self.v_low.to_bits(),
            self.v_high.to_bits(),
            self.i_ref.to_bits(),
            self.duty_cycle.to_bits(),
            self.v_ref.to_bits(),
            self.angle_or_correction.to_bits(),
        ]
    }

    pub fn from_words(w: &[u32; NB_CURVES]) -> Self {
        Self {
            i_low: f32::from_bits(w[0]),
            v_low: f32::from_bits(w[1]),
            v_high: f32::from_bits(w[2]),
            i_ref: f32::from_bits(w[3]),
            duty_cycle: f32::from_bits(w[4]),
            v_ref: f32::from_bits(w[5]),
            angle_or_correction: f32::from_bits(w[6]),
        }
    }
}
