//! Discrete-time calculations run once per control cycle.
//!
//! Everything here is single precision and allocation-free so that it can
//! be called from the critical activity.

mod phase;
mod pr;

pub use phase::PhaseAccumulator;
pub use pr::{PrParams, ProportionalResonant};
