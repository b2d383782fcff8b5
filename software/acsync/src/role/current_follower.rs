//! Current-follower role: tracks the current reference sent by the voltage source

use core::f32::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use acsync_shared::{Mode, PhaseCode, Record, SetpointMessage, Status};

use super::{CycleIo, Role, RoleKind};
use crate::calc::{PrParams, ProportionalResonant};
use crate::console::Command;
use crate::controller::context::ControllerCtx;
use crate::controller::output_stage::{OutputStage, StageTransition};
use crate::controller::shared::{SharedState, TelemetrySnapshot};
use crate::measurement::ControlSample;
use crate::peripheral::{Actuation, CycleSync};

/// Follows the peer's phase code: power while the last valid record says
/// running, idle otherwise. While powered, regulates `i1_low` onto the
/// received current reference with the received voltage reference as
/// feed-forward.
///
/// Without a timeout, a lost link holds the last received references
/// indefinitely. `max_silence_cycles` bounds that holdover.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct CurrentFollower {
    // User inputs
    pub kp: f32,
    pub kr: f32,
    /// Half of the DC bus voltage [V]; bounds the controller output
    pub udc: f32,
    /// Phase lead of the resonant term [rad]
    pub phase_lead: f32,
    /// Resonant frequency used until the first valid record arrives [Hz]
    pub f0_hz: f32,
    /// Drop to idle after this many cycles without a valid record
    pub max_silence_cycles: Option<u32>,

    // Last valid record
    #[serde(skip)]
    status: Status,
    #[serde(skip)]
    v_ref: f32,
    #[serde(skip)]
    i_ref: f32,
    #[serde(skip)]
    w0: f32,

    // Internal state
    #[serde(skip)]
    pr: Option<ProportionalResonant>,
    #[serde(skip)]
    stage: OutputStage,
    #[serde(skip)]
    sample: ControlSample,
    #[serde(skip)]
    correction: f32,
    #[serde(skip)]
    duty_cycle: f32,
    #[serde(skip)]
    silent_cycles: u32,
    #[serde(skip)]
    cycle: u64,
    #[serde(skip)]
    record_every: u64,
}

impl Default for CurrentFollower {
    fn default() -> Self {
        Self::new(0.2, 3000.0, 40.0)
    }
}

impl CurrentFollower {
    pub fn new(kp: f32, kr: f32, udc: f32) -> Self {
        Self {
            kp,
            kr,
            udc,
            phase_lead: 0.0,
            f0_hz: 50.0,
            max_silence_cycles: None,

            status: Status::default(),
            v_ref: 0.0,
            i_ref: 0.0,
            w0: 2.0 * PI * 50.0,

            pr: None,
            stage: OutputStage::default(),
            sample: ControlSample::default(),
            correction: 0.0,
            duty_cycle: 0.5,
            silent_cycles: 0,
            cycle: 0,
            record_every: 1,
        }
    }

    /// Bound the holdover on link loss
    pub fn with_max_silence_cycles(mut self, cycles: u32) -> Self {
        self.max_silence_cycles = Some(cycles);
        self
    }

    /// Status byte of the last valid record
    pub fn status(&self) -> Status {
        self.status
    }

    /// Voltage and current references in effect
    pub fn references(&self) -> (f32, f32) {
        (self.v_ref, self.i_ref)
    }

    /// Resonant frequency in effect [rad/s]
    pub fn w0(&self) -> f32 {
        self.w0
    }

    fn publish(&self, shared: &SharedState) {
        shared.publish(&TelemetrySnapshot {
            mode: self.stage.mode(),
            status: self.status,
            duty_cycle: self.duty_cycle,
            v_ref: self.v_ref,
            i_ref: self.i_ref,
            sample: self.sample,
        });
    }
}

#[typetag::serde]
impl Role for CurrentFollower {
    fn kind(&self) -> RoleKind {
        RoleKind::CurrentFollower
    }

    fn init(&mut self, ctx: &ControllerCtx) -> Result<(), String> {
        ctx.validate()?;
        if !(self.udc > 0.0) {
            return Err(format!("udc must be > 0, got {}", self.udc));
        }
        if !(self.f0_hz > 0.0) {
            return Err(format!("f0_hz must be > 0, got {}", self.f0_hz));
        }

        self.w0 = 2.0 * PI * self.f0_hz;
        let mut params = PrParams::new(ctx.ts(), self.kp, self.kr, self.w0, self.udc);
        params.phase_lead = self.phase_lead;
        self.pr = Some(ProportionalResonant::new(params));

        self.status = Status::default();
        self.v_ref = 0.0;
        self.i_ref = 0.0;
        self.stage = OutputStage::default();
        self.correction = 0.0;
        self.duty_cycle = 0.5;
        self.silent_cycles = 0;
        self.cycle = 0;
        self.record_every = u64::from(ctx.record_every);
        Ok(())
    }

    fn start_sync(&self, sync: &mut dyn CycleSync, ctx: &ControllerCtx) -> Result<(), String> {
        sync.init_slave(&ctx.peer_version)
    }

    fn on_measurement(&mut self, sample: &ControlSample) {
        self.sample = *sample;
    }

    fn on_protocol_message(&mut self, msg: &SetpointMessage, shared: &SharedState) {
        if !msg.status.is_valid() {
            return;
        }

        self.status = msg.status;
        self.v_ref = msg.voltage_reference;
        self.i_ref = msg.current_reference;
        self.silent_cycles = 0;

        let w0 = msg.resonant_frequency;
        if w0 != self.w0 && w0.is_finite() && w0 > 0.0 {
            self.w0 = w0;
            if let Some(pr) = self.pr.as_mut() {
                pr.set_frequency(w0);
            }
        }

        // Restart recording in step with the voltage source
        if msg.status.phase() == PhaseCode::RunningReset {
            shared.recorder.reset();
            self.cycle = 0;
        }
    }

    fn on_command(&mut self, cmd: Command, shared: &SharedState) {
        match cmd {
            Command::Idle => {
                shared.recorder.reset();
                info!("Current follower mode follows the link; recorder reset only");
            }
            Command::Power => info!("Current follower mode follows the link; ignoring"),
            Command::GainUp | Command::GainDown | Command::Help | Command::Download => {}
        }
    }

    fn tick(&mut self, io: &mut CycleIo<'_>) {
        let Some(pr) = self.pr.as_mut() else {
            return;
        };

        self.silent_cycles = self.silent_cycles.saturating_add(1);
        if let Some(limit) = self.max_silence_cycles {
            if self.silent_cycles > limit && self.status.phase().is_running() {
                warn!("No valid setpoint for {} cycles; dropping to idle", self.silent_cycles);
                self.status = Status::valid(PhaseCode::Idle);
            }
        }

        if self.status.phase().is_running() {
            self.correction = pr.calculate(self.i_ref, self.sample.i1_low);
            self.duty_cycle = (self.v_ref + self.correction) / (2.0 * self.udc) + 0.5;
            io.actuation.set_all_duty_cycle(self.duty_cycle);

            if self.stage.apply(Mode::Power, io.actuation) == StageTransition::Started {
                info!("Current follower started");
            }

            if self.cycle % self.record_every == 0 {
                io.shared.recorder.record(&Record {
                    i_low: self.sample.i1_low,
                    v_low: self.sample.v1_low,
                    v_high: self.sample.v_high,
                    i_ref: self.i_ref,
                    duty_cycle: self.duty_cycle,
                    v_ref: self.v_ref,
                    angle_or_correction: self.correction,
                });
            }
            self.cycle = self.cycle.wrapping_add(1);
        } else if self.stage.apply(Mode::Idle, io.actuation) == StageTransition::Stopped {
            info!("Current follower stopped");
        }

        self.publish(io.shared);
    }

    fn halt(&mut self, actuation: &mut dyn Actuation) {
        self.status = Status::default();
        if self.stage.apply(Mode::Idle, actuation) == StageTransition::Stopped {
            info!("Current follower halted");
        }
    }

    fn mode(&self) -> Mode {
        self.stage.mode()
    }
}
