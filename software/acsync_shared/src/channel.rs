//! Acquisition channels read once per control cycle.

/// Readings at or beyond this magnitude are treated as "no sample".
/// The acquisition layer reports `-MEAS_LIMIT` when a channel has no fresh value.
pub const MEAS_LIMIT: f32 = 10_000.0;

/// Measurement channels of one converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    /// Low-side current, leg 1
    I1Low,
    /// Low-side current, leg 2
    I2Low,
    /// Low-side voltage, leg 1
    V1Low,
    /// Low-side voltage, leg 2
    V2Low,
    /// High-side (bus) voltage
    VHigh,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::I1Low,
        Channel::V1Low,
        Channel::V2Low,
        Channel::I2Low,
        Channel::VHigh,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::I1Low => "i1_low",
            Channel::I2Low => "i2_low",
            Channel::V1Low => "v1_low",
            Channel::V2Low => "v2_low",
            Channel::VHigh => "v_high",
        }
    }
}

/// Whether a raw reading is usable. NaN is rejected.
pub fn in_range(raw: f32) -> bool {
    raw > -MEAS_LIMIT && raw < MEAS_LIMIT
}
