//! Control core for a voltage-source / current-follower AC converter pair.

pub mod app;
pub mod calc;
pub mod console;
pub mod controller;
pub mod logging;
pub mod measurement;
pub mod peripheral;
pub mod recorder;
pub mod role;
pub mod socket;

pub use console::Command;
pub use controller::{ConsoleIo, Controller, ControllerCtx, Node, NodeIo, RunHandle};
pub use role::{CurrentFollower, Role, RoleKind, VoltageSource};
