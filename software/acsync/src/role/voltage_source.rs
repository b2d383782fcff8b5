//! Voltage-source role: generates the AC voltage and distributes references

use core::f32::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::info;

use acsync_shared::{Mode, PhaseCode, Record, SetpointMessage, Status};

use super::{CycleIo, Role, RoleKind};
use crate::calc::{PhaseAccumulator, PrParams, ProportionalResonant};
use crate::console::Command;
use crate::controller::context::ControllerCtx;
use crate::controller::output_stage::{OutputStage, StageTransition};
use crate::controller::shared::{SharedState, TelemetrySnapshot};
use crate::measurement::ControlSample;
use crate::peripheral::{Actuation, CycleSync};

/// Step applied to the current-reference gain by the console
const GAIN_STEP: f32 = 0.1;

/// Regulates `v1_low - v2_low` onto `amplitude * sin(w0 t)` and sends
/// `k_gain * i1_low` as the follower's current reference.
///
/// Mode is requested from the console; the output stage follows it.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct VoltageSource {
    // User inputs
    /// Peak of the generated voltage [V]
    pub amplitude: f32,
    /// Frequency of the generated voltage [Hz]
    pub f0_hz: f32,
    pub kp: f32,
    pub kr: f32,
    /// Half of the DC bus voltage [V]; bounds the controller output
    pub udc: f32,
    /// Phase lead of the resonant term [rad]
    pub phase_lead: f32,

    // Internal state
    #[serde(skip)]
    requested: Mode,
    #[serde(skip)]
    k_gain: f32,
    #[serde(skip)]
    w0: f32,
    #[serde(skip)]
    phase: PhaseAccumulator,
    #[serde(skip)]
    pr: Option<ProportionalResonant>,
    #[serde(skip)]
    stage: OutputStage,
    #[serde(skip)]
    sample: ControlSample,
    #[serde(skip)]
    tx: SetpointMessage,
    #[serde(skip)]
    duty_cycle: f32,
    #[serde(skip)]
    cycle: u64,
    #[serde(skip)]
    record_every: u64,
}

impl Default for VoltageSource {
    fn default() -> Self {
        Self::new(12.0, 50.0, 0.02, 4000.0, 40.0)
    }
}

impl VoltageSource {
    pub fn new(amplitude: f32, f0_hz: f32, kp: f32, kr: f32, udc: f32) -> Self {
        Self {
            amplitude,
            f0_hz,
            kp,
            kr,
            udc,
            phase_lead: 0.0,

            requested: Mode::Idle,
            k_gain: 1.0,
            w0: 2.0 * PI * f0_hz,
            phase: PhaseAccumulator::default(),
            pr: None,
            stage: OutputStage::default(),
            sample: ControlSample::default(),
            tx: SetpointMessage::default(),
            duty_cycle: 0.5,
            cycle: 0,
            record_every: 1,
        }
    }

    /// Gain from measured current to distributed current reference
    pub fn k_gain(&self) -> f32 {
        self.k_gain
    }

    /// Last record handed to the link
    pub fn last_sent(&self) -> &SetpointMessage {
        &self.tx
    }

    fn publish(&self, shared: &SharedState) {
        shared.publish(&TelemetrySnapshot {
            mode: self.stage.mode(),
            status: self.tx.status,
            duty_cycle: self.duty_cycle,
            v_ref: self.tx.voltage_reference,
            i_ref: self.tx.current_reference,
            sample: self.sample,
        });
    }
}

#[typetag::serde]
impl Role for VoltageSource {
    fn kind(&self) -> RoleKind {
        RoleKind::VoltageSource
    }

    fn init(&mut self, ctx: &ControllerCtx) -> Result<(), String> {
        ctx.validate()?;
        if !(self.udc > 0.0) {
            return Err(format!("udc must be > 0, got {}", self.udc));
        }
        if !(self.f0_hz > 0.0) {
            return Err(format!("f0_hz must be > 0, got {}", self.f0_hz));
        }

        let ts = ctx.ts();
        self.w0 = 2.0 * PI * self.f0_hz;
        let mut params = PrParams::new(ts, self.kp, self.kr, self.w0, self.udc);
        params.phase_lead = self.phase_lead;
        self.pr = Some(ProportionalResonant::new(params));
        self.phase = PhaseAccumulator::new(self.w0, ts);

        self.requested = Mode::Idle;
        self.stage = OutputStage::default();
        self.k_gain = 1.0;
        self.tx = SetpointMessage {
            resonant_frequency: self.w0,
            status: Status::valid(PhaseCode::Idle),
            ..Default::default()
        };
        self.duty_cycle = 0.5;
        self.cycle = 0;
        self.record_every = u64::from(ctx.record_every);
        Ok(())
    }

    fn start_sync(&self, sync: &mut dyn CycleSync, _ctx: &ControllerCtx) -> Result<(), String> {
        sync.init_master()
    }

    fn on_measurement(&mut self, sample: &ControlSample) {
        self.sample = *sample;
    }

    /// The voltage source does not follow its peer
    fn on_protocol_message(&mut self, _msg: &SetpointMessage, _shared: &SharedState) {}

    fn on_command(&mut self, cmd: Command, shared: &SharedState) {
        match cmd {
            Command::Idle => {
                self.requested = Mode::Idle;
                shared.recorder.reset();
            }
            Command::Power => self.requested = Mode::Power,
            Command::GainUp => self.k_gain += GAIN_STEP,
            Command::GainDown => self.k_gain -= GAIN_STEP,
            Command::Help | Command::Download => {}
        }
    }

    fn tick(&mut self, io: &mut CycleIo<'_>) {
        let Some(pr) = self.pr.as_mut() else {
            return;
        };

        match self.requested.or_idle() {
            Mode::Power => {
                let angle = self.phase.advance();
                let v_ref = self.amplitude * angle.sin();
                let correction = pr.calculate(v_ref, self.sample.v_low_diff());
                self.duty_cycle = 0.5 + correction / (2.0 * self.udc);
                io.actuation.set_all_duty_cycle(self.duty_cycle);

                // Tell the follower to restart its recording together with ours
                let phase = if io.shared.recorder.cursor() == 0 {
                    PhaseCode::RunningReset
                } else {
                    PhaseCode::Running
                };
                let i_ref = self.k_gain * self.sample.i1_low;
                self.tx = SetpointMessage {
                    voltage_reference: v_ref,
                    current_reference: i_ref,
                    resonant_frequency: self.w0,
                    status: Status::valid(phase),
                    reserved: [0; 3],
                };
                io.transmit(&self.tx);

                if self.cycle % self.record_every == 0 {
                    io.shared.recorder.record(&Record {
                        i_low: self.sample.i1_low,
                        v_low: self.sample.v1_low,
                        v_high: self.sample.v_high,
                        i_ref,
                        duty_cycle: self.duty_cycle,
                        v_ref,
                        angle_or_correction: angle,
                    });
                }

                if self.stage.apply(Mode::Power, io.actuation) == StageTransition::Started {
                    info!("Voltage source started");
                }
                self.cycle = self.cycle.wrapping_add(1);
            }
            _ => {
                if self.stage.apply(Mode::Idle, io.actuation) == StageTransition::Stopped {
                    self.k_gain = 1.0;
                    self.phase.reset();
                    self.tx.status = Status::valid(PhaseCode::Idle);
                    io.transmit(&self.tx);
                    info!("Voltage source stopped");
                }
            }
        }

        self.publish(io.shared);
    }

    fn halt(&mut self, actuation: &mut dyn Actuation) {
        self.requested = Mode::Idle;
        if self.stage.apply(Mode::Idle, actuation) == StageTransition::Stopped {
            info!("Voltage source halted");
        }
    }

    fn mode(&self) -> Mode {
        self.stage.mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use acsync_shared::ByteStructLen;

    use crate::peripheral::{HwCall, MockupBoard};
    use crate::socket::{Link, LinkConfig, MemoryLink};

    struct Rig {
        role: VoltageSource,
        board: MockupBoard,
        link: MemoryLink,
        shared: SharedState,
        sent: Arc<Mutex<Vec<SetpointMessage>>>,
        _peer: MemoryLink,
    }

    impl Rig {
        fn new() -> Self {
            let mut role = VoltageSource::default();
            role.init(&ControllerCtx::default()).unwrap();

            let cfg = LinkConfig {
                message_size: SetpointMessage::BYTE_LEN,
                speed_hz: 20_000_000,
            };
            let (mut link, mut peer) = MemoryLink::pair();
            link.open(cfg, Box::new(|_| {})).unwrap();
            let sent = Arc::new(Mutex::new(Vec::new()));
            let sink = sent.clone();
            peer.open(
                cfg,
                Box::new(move |b| {
                    sink.lock()
                        .unwrap()
                        .push(SetpointMessage::from_bytes(b).unwrap())
                }),
            )
            .unwrap();

            Self {
                role,
                board: MockupBoard::new(),
                link,
                shared: SharedState::new(),
                sent,
                _peer: peer,
            }
        }

        fn tick(&mut self) {
            let mut actuation = self.board.clone();
            let mut io = CycleIo {
                actuation: &mut actuation,
                link: &mut self.link,
                shared: &self.shared,
            };
            self.role.tick(&mut io);
        }

        fn sent(&self) -> Vec<SetpointMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[test]
    fn idle_is_quiet() {
        let mut rig = Rig::new();
        rig.tick();
        rig.tick();
        assert!(rig.board.calls().is_empty());
        assert!(rig.sent().is_empty());
        assert_eq!(rig.role.mode(), Mode::Idle);
    }

    #[test]
    fn power_cycle_drives_legs_and_sends_setpoints() {
        let mut rig = Rig::new();
        rig.role.on_measurement(&ControlSample {
            i1_low: 2.0,
            ..Default::default()
        });
        rig.role.on_command(Command::Power, &rig.shared);
        rig.tick();

        let calls = rig.board.calls();
        assert!(matches!(calls[0], HwCall::SetDuty(_)));
        assert_eq!(&calls[1..], &[HwCall::IndicatorOn, HwCall::StartAll]);
        assert_eq!(rig.role.mode(), Mode::Power);

        let sent = rig.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].status.is_valid());
        assert_eq!(sent[0].status.phase(), PhaseCode::RunningReset);
        assert_eq!(sent[0].current_reference, 2.0);
        assert_eq!(sent[0].resonant_frequency, 2.0 * PI * 50.0);
        let expected_v_ref = 12.0 * (2.0 * PI * 50.0 * 100e-6_f32).sin();
        assert!((sent[0].voltage_reference - expected_v_ref).abs() < 1e-4);

        // Record written on the first cycle moves the cursor off zero
        rig.tick();
        assert_eq!(rig.sent()[1].status.phase(), PhaseCode::Running);
        assert_eq!(rig.shared.snapshot().mode, Mode::Power);
    }

    #[test]
    fn duty_centered_on_half() {
        let mut rig = Rig::new();
        rig.role.on_command(Command::Power, &rig.shared);
        for _ in 0..500 {
            rig.tick();
            let duty = rig.board.duty();
            assert!((0.0..=1.0).contains(&duty), "duty {duty} out of range");
        }
    }

    #[test]
    fn records_every_fourth_cycle() {
        let mut rig = Rig::new();
        rig.role.on_command(Command::Power, &rig.shared);
        for _ in 0..40 {
            rig.tick();
        }
        assert_eq!(rig.shared.recorder.cursor(), 10);
        let first = rig.shared.recorder.get(0).unwrap();
        assert!(first.angle_or_correction > 0.0);
    }

    #[test]
    fn stopping_resets_gain_and_announces_idle_once() {
        let mut rig = Rig::new();
        rig.role.on_command(Command::Power, &rig.shared);
        rig.role.on_command(Command::GainUp, &rig.shared);
        rig.role.on_command(Command::GainUp, &rig.shared);
        assert!((rig.role.k_gain() - 1.2).abs() < 1e-6);
        rig.tick();
        rig.tick();
        assert!(rig.shared.recorder.cursor() > 0);

        rig.role.on_command(Command::Idle, &rig.shared);
        assert_eq!(rig.shared.recorder.cursor(), 0);
        rig.board.clear_calls();
        let before = rig.sent().len();

        rig.tick();
        rig.tick();
        rig.tick();

        assert_eq!(
            rig.board.calls(),
            vec![HwCall::StopAll, HwCall::IndicatorOff]
        );
        let sent = rig.sent();
        assert_eq!(sent.len(), before + 1);
        assert_eq!(sent[before].status, Status::valid(PhaseCode::Idle));
        assert_eq!(rig.role.k_gain(), 1.0);
        assert_eq!(rig.role.mode(), Mode::Idle);
    }

    #[test]
    fn uninitialized_role_does_nothing() {
        let mut rig = Rig::new();
        rig.role = VoltageSource::default();
        rig.role.on_command(Command::Power, &rig.shared);
        rig.tick();
        assert!(rig.board.calls().is_empty());
    }

    #[test]
    fn rejects_bad_bus_voltage() {
        let mut role = VoltageSource::new(12.0, 50.0, 0.02, 4000.0, 0.0);
        assert!(role.init(&ControllerCtx::default()).is_err());
    }
}
