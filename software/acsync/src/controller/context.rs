//! Configuration of one node's control operation.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};

/// Operation context shared by the role and the controller's activities
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ControllerCtx {
    /// Control cycle period in nanoseconds
    pub dt_ns: u32,

    /// Record one telemetry sample every this many power cycles
    pub record_every: u32,

    /// Delay between passes of the application activity
    pub app_period_ms: u64,

    /// Delay between words while dumping the recorder
    pub drain_pace_ms: u64,

    /// Line rate requested from the link
    pub link_speed_hz: u32,

    /// Hardware version announced to the cycle synchronization when following a peer
    pub peer_version: String,

    /// A name for this operation, used for the log file name
    pub op_name: String,

    /// A directory to place outputs
    pub op_dir: PathBuf,
}

impl Default for ControllerCtx {
    fn default() -> Self {
        // Start time names the log file; ':' is not allowed in Windows paths
        let started: DateTime<Utc> = SystemTime::now().into();
        let op_name = started
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            .replace(':', "");
        Self {
            dt_ns: 100_000,
            record_every: 4,
            app_period_ms: 100,
            drain_pace_ms: 1,
            link_speed_hz: 20_000_000,
            peer_version: "1.1.4".to_owned(),
            op_name,
            op_dir: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl ControllerCtx {
    /// Control period in seconds
    pub fn ts(&self) -> f32 {
        self.dt_ns as f32 * 1e-9
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.dt_ns == 0 {
            return Err("dt_ns must be > 0".to_string());
        }
        if self.record_every == 0 {
            return Err("record_every must be > 0".to_string());
        }
        if self.op_name.is_empty() {
            return Err("op_name must not be empty".to_string());
        }
        Ok(())
    }
}
