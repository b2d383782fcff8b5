//! Application activity: periodic telemetry line and recorder dumps.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::info;

use acsync_shared::Mode;

use crate::controller::shared::{SharedState, TelemetrySnapshot};
use crate::recorder::Recorder;
use crate::role::RoleKind;

/// One colon-separated telemetry line
pub fn format_telemetry_line(kind: RoleKind, t: &TelemetrySnapshot) -> String {
    let mut line = String::new();
    if kind == RoleKind::CurrentFollower {
        line.push_str(&format!("{}:{:.6}:", t.status.to_byte(), t.i_ref));
    }
    line.push_str(&format!(
        "{:.6}:{:.6}:{:.6}:{:.6}:{:.6}:",
        t.duty_cycle, t.v_ref, t.sample.i2_low, t.sample.i1_low, t.sample.v1_low
    ));
    line
}

/// Write every recorder word as 8 hex digits, one per line, between
/// `begin record` / `end record` markers. Waits `pace` after each word.
///
/// Stops early if `stop` is raised. Returns the number of words written.
pub fn dump_recorder(
    out: &mut dyn Write,
    recorder: &Recorder,
    pace: Duration,
    stop: &AtomicBool,
) -> std::io::Result<usize> {
    writeln!(out, "begin record")?;
    let mut n = 0;
    for word in recorder.words() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        writeln!(out, "{word:08x}")?;
        n += 1;
        if !pace.is_zero() {
            out.flush()?;
            std::thread::sleep(pace);
        }
    }
    writeln!(out, "end record")?;
    out.flush()?;
    Ok(n)
}

/// One pass of the application activity
pub fn application_pass(
    out: &mut dyn Write,
    kind: RoleKind,
    shared: &SharedState,
    drain_pace: Duration,
    stop: &AtomicBool,
) -> std::io::Result<()> {
    let t = shared.snapshot();
    if t.mode == Mode::Power {
        writeln!(out, "{}", format_telemetry_line(kind, &t))?;
    }

    if shared.is_downloading() {
        let n = dump_recorder(out, &shared.recorder, drain_pace, stop)?;
        info!("Dumped {n} recorder words");
        shared.set_downloading(false);
    }
    out.flush()
}

/// Run passes until `stop` is raised
pub fn run_application(
    out: &mut dyn Write,
    kind: RoleKind,
    shared: &SharedState,
    period: Duration,
    drain_pace: Duration,
    stop: &AtomicBool,
) -> std::io::Result<()> {
    while !stop.load(Ordering::Relaxed) {
        application_pass(out, kind, shared, drain_pace, stop)?;
        std::thread::sleep(period);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use acsync_shared::{NB_CURVES, PhaseCode, Record, Status};

    #[test]
    fn dump_covers_whole_recorder() {
        let recorder = Recorder::with_capacity(3);
        recorder.record(&Record {
            i_low: 1.0,
            ..Default::default()
        });
        let mut out: Vec<u8> = Vec::new();
        let n = dump_recorder(&mut out, &recorder, Duration::ZERO, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(n, 3 * NB_CURVES);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"begin record"));
        assert_eq!(lines.last(), Some(&"end record"));
        assert_eq!(lines[1], "3f800000");
        assert_eq!(lines.len(), 3 * NB_CURVES + 2);
    }

    #[test]
    fn dump_stops_on_request() {
        let recorder = Recorder::with_capacity(3);
        let mut out: Vec<u8> = Vec::new();
        let n = dump_recorder(&mut out, &recorder, Duration::ZERO, &AtomicBool::new(true))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn pass_prints_only_in_power_and_clears_download() {
        let shared = SharedState::new();
        let stop = AtomicBool::new(false);
        let mut out: Vec<u8> = Vec::new();

        application_pass(&mut out, RoleKind::VoltageSource, &shared, Duration::ZERO, &stop)
            .unwrap();
        assert!(out.is_empty());

        shared.publish(&TelemetrySnapshot {
            mode: Mode::Power,
            status: Status::valid(PhaseCode::Running),
            duty_cycle: 0.5,
            ..Default::default()
        });
        shared.set_downloading(true);
        application_pass(&mut out, RoleKind::CurrentFollower, &shared, Duration::ZERO, &stop)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("65:0.000000:0.500000:"), "{text}");
        assert!(text.contains("end record"));
        assert!(!shared.is_downloading());
    }
}
