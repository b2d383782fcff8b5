//! Pulse-enable state of the power stage, kept consistent with the mode.
//!
//! ```text
//!   mode \ pwm |  Off                          |  On
//!   -----------+-------------------------------+------------------------------
//!   Idle       |  no-op                        |  stop_all, indicator_off -> Off
//!   Power      |  indicator_on, start_all -> On|  no-op
//! ```
//!
//! Re-entering the current state never touches the hardware.

use acsync_shared::Mode;

use crate::peripheral::Actuation;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PwmState {
    #[default]
    Off,
    On,
}

/// What [`OutputStage::apply`] did to the hardware
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageTransition {
    Unchanged,
    Started,
    Stopped,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OutputStage {
    mode: Mode,
    pwm: PwmState,
}

impl OutputStage {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pwm(&self) -> PwmState {
        self.pwm
    }

    /// Move to `mode`, starting or stopping the legs if the enable state must change.
    /// Unknown modes are treated as idle.
    pub fn apply(&mut self, mode: Mode, hw: &mut dyn Actuation) -> StageTransition {
        let mode = mode.or_idle();
        self.mode = mode;
        match (mode, self.pwm) {
            (Mode::Idle, PwmState::On) => {
                hw.stop_all();
                hw.indicator_off();
                self.pwm = PwmState::Off;
                StageTransition::Stopped
            }
            (Mode::Power, PwmState::Off) => {
                hw.indicator_on();
                hw.start_all();
                self.pwm = PwmState::On;
                StageTransition::Started
            }
            _ => StageTransition::Unchanged,
        }
    }
}
