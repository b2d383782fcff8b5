//! Board-side collaborators of the control loop.
//!
//! The control core never touches hardware directly. A board support layer
//! implements these traits; `mockup` provides an in-memory board for tests
//! and host-side runs.

use core::fmt::Debug;

pub use acsync_shared::Channel;

pub mod mockup;
pub use mockup::{HwCall, MockupBoard, PlantModel};

/// Analog acquisition
pub trait Acquisition: Send {
    /// Latest converted value of a channel in engineering units.
    ///
    /// Returns `-acsync_shared::channel::MEAS_LIMIT` when no valid sample is available.
    fn get_latest(&mut self, channel: Channel) -> f32;
}

/// Power stage legs and the status indicator
pub trait Actuation: Send {
    /// Duty cycle in `[0, 1]` applied to every leg
    fn set_all_duty_cycle(&mut self, duty: f32);

    /// Enable switching on every leg
    fn start_all(&mut self);

    /// Disable switching on every leg
    fn stop_all(&mut self);

    fn indicator_on(&mut self);

    fn indicator_off(&mut self);
}

/// Alignment of the two nodes' control periods
pub trait CycleSync: Send + Debug {
    /// Drive the shared sync signal
    fn init_master(&mut self) -> Result<(), String>;

    /// Follow the sync signal of a peer with the given hardware version
    fn init_slave(&mut self, peer_version: &str) -> Result<(), String>;
}
