//! Per-node control behavior.
//!
//! A node runs exactly one role for its whole lifetime. Roles are
//! serialized with the controller configuration as `Box<dyn Role>`, so the
//! role is chosen when the configuration is loaded.

use core::fmt::Debug;

use tracing::warn;

use acsync_shared::{Mode, SetpointMessage};

use crate::console::Command;
use crate::controller::context::ControllerCtx;
use crate::controller::shared::SharedState;
use crate::measurement::ControlSample;
use crate::peripheral::{Actuation, CycleSync};
use crate::socket::Link;

mod current_follower;
mod voltage_source;

pub use current_follower::CurrentFollower;
pub use voltage_source::VoltageSource;

/// Which side of the pair a role plays
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleKind {
    /// Generates the AC voltage and distributes references
    VoltageSource,
    /// Tracks the distributed current reference
    CurrentFollower,
}

impl RoleKind {
    pub fn label(&self) -> &'static str {
        match self {
            RoleKind::VoltageSource => "SERVER",
            RoleKind::CurrentFollower => "CLIENT",
        }
    }
}

/// Hardware and link access for one control cycle
pub struct CycleIo<'a> {
    pub actuation: &'a mut dyn Actuation,
    pub link: &'a mut dyn Link,
    pub shared: &'a SharedState,
}

impl CycleIo<'_> {
    /// Fire-and-forget send of the outgoing record
    pub fn transmit(&mut self, msg: &SetpointMessage) {
        let result = self.link.transmit(&msg.to_bytes());
        let first_failure = self.shared.note_transmit(result.is_ok());
        if let (true, Err(e)) = (first_failure, result) {
            warn!("Setpoint transmit failing: {e}");
        }
    }
}

/// Control behavior of one node, driven once per cycle by the critical activity.
///
/// Call order within a cycle: `on_measurement`, then `on_protocol_message`
/// for every record received since the last cycle, then `on_command` for
/// every queued console command, then `tick`.
#[typetag::serde(tag = "type")]
pub trait Role: Send + Sync + Debug {
    fn kind(&self) -> RoleKind;

    /// Build controllers and clear run state
    fn init(&mut self, ctx: &ControllerCtx) -> Result<(), String>;

    /// Join the cycle synchronization on the appropriate side
    fn start_sync(&self, sync: &mut dyn CycleSync, ctx: &ControllerCtx) -> Result<(), String>;

    /// Latest filtered measurements
    fn on_measurement(&mut self, sample: &ControlSample);

    /// A record from the peer, decoded but not yet validated
    fn on_protocol_message(&mut self, msg: &SetpointMessage, shared: &SharedState);

    fn on_command(&mut self, cmd: Command, shared: &SharedState);

    /// Run the control law and drive the outputs
    fn tick(&mut self, io: &mut CycleIo<'_>);

    /// Force the outputs off before the controller exits
    fn halt(&mut self, actuation: &mut dyn Actuation);

    fn mode(&self) -> Mode;
}
