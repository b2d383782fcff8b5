//! Operating mode of a node.
use crate::wire_enum;

wire_enum!(
    /// Exactly one mode is active at a time; the PWM enable state follows it.
    #[derive(Default)]
    pub enum Mode(u8) {
        /// Outputs disabled
        #[default]
        Idle = 0,
        /// Outputs switching under closed-loop control
        Power = 1,
    }
);

impl Mode {
    /// Collapse unknown raw values to `Idle`
    pub fn or_idle(self) -> Self {
        match self {
            Mode::Unknown(_) => Mode::Idle,
            m => m,
        }
    }
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Mode::Idle => write!(f, "idle"),
            Mode::Power => write!(f, "power"),
            Mode::Unknown(x) => write!(f, "unknown({x})"),
        }
    }
}
