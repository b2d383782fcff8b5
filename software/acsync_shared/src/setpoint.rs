//! The setpoint record sent once per control cycle from the voltage source
//! to the current follower.
//!
//! ```text
//! offset  size  field
//!      0     4  voltage_reference   f32 LE
//!      4     4  current_reference   f32 LE
//!      8     4  resonant_frequency  f32 LE, rad/s
//!     12     1  status              bit 6 valid, bits 0-1 phase code
//!     13     3  reserved            zero, pads to the 4-byte alignment
//!                                   of the record on the converter boards
//! ```
use crate::wire_enum;
use byte_struct::*;
pub use byte_struct::{ByteStruct, ByteStructLen};

wire_enum!(
    /// Sequencing code carried in the low two bits of the status byte
    #[derive(Default)]
    pub enum PhaseCode(u8) {
        /// Sender is stopped
        #[default]
        Idle = 0b00,
        /// Sender is producing power
        Running = 0b01,
        /// Sender is producing power and its sample counter is at zero;
        /// the receiver restarts its own recording
        RunningReset = 0b10,
    }
);

impl PhaseCode {
    /// Either of the two running sub-codes
    pub fn is_running(&self) -> bool {
        matches!(self, PhaseCode::Running | PhaseCode::RunningReset)
    }
}

/// Status byte of a [`SetpointMessage`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Status(u8);

impl Status {
    /// Set when the message carries usable references
    pub const VALID_BIT: u8 = 1 << 6;

    /// Bits holding the [`PhaseCode`]
    pub const PHASE_MASK: u8 = 0b11;

    /// A valid status with the given phase code
    pub fn valid(phase: PhaseCode) -> Self {
        Self(Self::VALID_BIT | (u8::from(phase) & Self::PHASE_MASK))
    }

    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 & Self::VALID_BIT != 0
    }

    pub fn phase(&self) -> PhaseCode {
        PhaseCode::from(self.0 & Self::PHASE_MASK)
    }
}

impl ByteStructLen for Status {
    const BYTE_LEN: usize = 1;
}

impl ByteStruct for Status {
    fn read_bytes(bytes: &[u8]) -> Self {
        Self(bytes[0])
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        bytes[0] = self.0;
    }
}

/// References distributed by the voltage source.
///
/// The receiver acts on a message only if its status is valid; otherwise
/// the previously received references stay in effect.
#[derive(ByteStruct, Clone, Copy, Debug, Default, PartialEq)]
#[byte_struct_le]
pub struct SetpointMessage {
    /// Instantaneous output voltage reference [V]
    pub voltage_reference: f32,

    /// Instantaneous current reference for the follower [A]
    pub current_reference: f32,

    /// Angular frequency of the AC reference [rad/s]
    pub resonant_frequency: f32,

    pub status: Status,

    /// Always zero on transmit, ignored on receive
    pub reserved: [u8; 3],
}

impl SetpointMessage {
    /// Encode into a fixed-size buffer
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut buf = [0_u8; Self::BYTE_LEN];
        let msg = Self {
            reserved: [0; 3],
            ..*self
        };
        msg.write_bytes(&mut buf);
        buf
    }

    /// Decode a received buffer, rejecting anything that is not exactly one record
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::BYTE_LEN {
            return None;
        }
        Some(Self::read_bytes(bytes))
    }
}
