//! Single-key operator commands and the console activity.

use std::io::{Read, Write};

use crossbeam::channel::Sender;
use tracing::{debug, info};

use crate::controller::shared::SharedState;
use crate::role::RoleKind;

/// Operator command, one key each
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// `h`: print the menu
    Help,
    /// `i`: stop producing power and restart recording
    Idle,
    /// `p`: produce power
    Power,
    /// `l`: raise the distributed current gain
    GainUp,
    /// `m`: lower the distributed current gain
    GainDown,
    /// `r`: dump the recorder
    Download,
}

impl Command {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'h' => Some(Command::Help),
            b'i' => Some(Command::Idle),
            b'p' => Some(Command::Power),
            b'l' => Some(Command::GainUp),
            b'm' => Some(Command::GainDown),
            b'r' => Some(Command::Download),
            _ => None,
        }
    }
}

fn write_menu(out: &mut dyn Write, kind: RoleKind) -> std::io::Result<()> {
    writeln!(out, " ________________________________________")?;
    writeln!(out, "|     ----AC client/server: {} ---       |", kind.label())?;
    writeln!(out, "|     press i : idle mode                |")?;
    writeln!(out, "|     press p : power mode               |")?;
    if kind == RoleKind::VoltageSource {
        writeln!(out, "|     press l : raise current gain       |")?;
        writeln!(out, "|     press m : lower current gain       |")?;
    }
    writeln!(out, "|     press r : download record          |")?;
    writeln!(out, "|________________________________________|")?;
    writeln!(out)
}

/// Act on one command.
///
/// Mode and gain changes are queued for the critical activity;
/// a download request is flagged for the application activity.
pub fn handle_command(
    cmd: Command,
    kind: RoleKind,
    shared: &SharedState,
    to_critical: &Sender<Command>,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    let forward = |cmd: Command| {
        if to_critical.try_send(cmd).is_err() {
            debug!("Command queue full; dropped {cmd:?}");
        }
    };

    match cmd {
        Command::Help => write_menu(out, kind)?,
        Command::Idle => {
            writeln!(out, "idle mode")?;
            forward(cmd);
        }
        Command::Power => {
            // Switching on mid-download would overwrite the data being dumped
            if !shared.is_downloading() {
                writeln!(out, "power mode")?;
                forward(cmd);
            }
        }
        Command::GainUp | Command::GainDown => {
            if kind == RoleKind::VoltageSource {
                forward(cmd);
            }
        }
        Command::Download => shared.set_downloading(true),
    }
    out.flush()
}

/// Console activity: block on one byte at a time and dispatch it.
/// Returns when the input reaches end of file.
pub fn run_console(
    input: &mut dyn Read,
    out: &mut dyn Write,
    kind: RoleKind,
    shared: &SharedState,
    to_critical: &Sender<Command>,
) -> std::io::Result<()> {
    let mut byte = [0_u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => {
                info!("Console input closed");
                return Ok(());
            }
            Ok(_) => {
                if let Some(cmd) = Command::from_byte(byte[0]) {
                    handle_command(cmd, kind, shared, to_critical, out)?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
