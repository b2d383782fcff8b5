//! In-memory board that logs every actuation call and can close the loop
//! through a simple plant model.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use acsync_shared::channel::MEAS_LIMIT;

use super::{Acquisition, Actuation, Channel, CycleSync};

/// One call made on the actuation interface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HwCall {
    SetDuty(f32),
    StartAll,
    StopAll,
    IndicatorOn,
    IndicatorOff,
}

/// Averaged model of one converter leg feeding a resistive load.
///
/// The leg voltage is `(duty - 0.5) * 2 * udc` while switching and zero
/// otherwise.
#[derive(Debug, Clone, Copy)]
pub struct PlantModel {
    pub udc: f32,
    pub load_ohms: f32,
}

#[derive(Debug, Default)]
struct BoardState {
    scripted: BTreeMap<Channel, VecDeque<f32>>,
    fixed: BTreeMap<Channel, f32>,
    calls: Vec<HwCall>,
    pwm_on: bool,
    indicator: bool,
    duty: f32,
    plant: Option<PlantModel>,
    sync: Option<String>,
}

/// Cloneable handle to a shared mock board.
///
/// Hand one clone to the controller as acquisition, one as actuation,
/// and keep another to inspect or script it.
#[derive(Clone, Debug, Default)]
pub struct MockupBoard {
    state: Arc<Mutex<BoardState>>,
}

impl MockupBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Board whose readings are produced by a plant model
    pub fn with_plant(plant: PlantModel) -> Self {
        let board = Self::default();
        board.lock().plant = Some(plant);
        board
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        // A panicking test thread must not hide the board from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hold a channel at a value until changed
    pub fn set_reading(&self, channel: Channel, value: f32) {
        self.lock().fixed.insert(channel, value);
    }

    /// Queue readings for a channel; each is returned once, then the
    /// fixed value (or the plant) takes over again
    pub fn script_readings(&self, channel: Channel, values: &[f32]) {
        self.lock()
            .scripted
            .entry(channel)
            .or_default()
            .extend(values.iter().copied());
    }

    /// Calls made so far, oldest first
    pub fn calls(&self) -> Vec<HwCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn pwm_on(&self) -> bool {
        self.lock().pwm_on
    }

    pub fn indicator(&self) -> bool {
        self.lock().indicator
    }

    pub fn duty(&self) -> f32 {
        self.lock().duty
    }

    /// Sync role requested by the controller, if any
    pub fn sync_role(&self) -> Option<String> {
        self.lock().sync.clone()
    }
}

impl BoardState {
    fn plant_reading(&self, plant: &PlantModel, channel: Channel) -> f32 {
        let v_leg = if self.pwm_on {
            (self.duty - 0.5) * 2.0 * plant.udc
        } else {
            0.0
        };
        let i_load = v_leg / plant.load_ohms;
        match channel {
            Channel::V1Low => v_leg,
            Channel::V2Low => 0.0,
            Channel::I1Low => i_load,
            Channel::I2Low => -i_load,
            Channel::VHigh => 2.0 * plant.udc,
        }
    }
}

impl Acquisition for MockupBoard {
    fn get_latest(&mut self, channel: Channel) -> f32 {
        let mut state = self.lock();
        if let Some(v) = state.scripted.get_mut(&channel).and_then(|q| q.pop_front()) {
            return v;
        }
        if let Some(v) = state.fixed.get(&channel) {
            return *v;
        }
        match state.plant {
            Some(plant) => state.plant_reading(&plant, channel),
            None => -MEAS_LIMIT,
        }
    }
}

impl Actuation for MockupBoard {
    fn set_all_duty_cycle(&mut self, duty: f32) {
        let mut state = self.lock();
        state.duty = duty;
        state.calls.push(HwCall::SetDuty(duty));
    }

    fn start_all(&mut self) {
        let mut state = self.lock();
        state.pwm_on = true;
        state.calls.push(HwCall::StartAll);
    }

    fn stop_all(&mut self) {
        let mut state = self.lock();
        state.pwm_on = false;
        state.calls.push(HwCall::StopAll);
    }

    fn indicator_on(&mut self) {
        let mut state = self.lock();
        state.indicator = true;
        state.calls.push(HwCall::IndicatorOn);
    }

    fn indicator_off(&mut self) {
        let mut state = self.lock();
        state.indicator = false;
        state.calls.push(HwCall::IndicatorOff);
    }
}

impl CycleSync for MockupBoard {
    fn init_master(&mut self) -> Result<(), String> {
        self.lock().sync = Some("master".to_owned());
        Ok(())
    }

    fn init_slave(&mut self, peer_version: &str) -> Result<(), String> {
        self.lock().sync = Some(format!("slave:{peer_version}"));
        Ok(())
    }
}
