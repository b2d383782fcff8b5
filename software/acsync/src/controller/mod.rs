//! Node assembly and the three activities that drive it.
//!
//! A node runs:
//! * a critical activity that executes one control cycle per period,
//! * an application activity that prints telemetry and dumps the recorder,
//! * a console activity that turns key presses into commands.
//!
//! They only share the atomics in [`SharedState`], a bounded inbox of
//! received setpoint records that evicts its oldest entry when full, and a
//! bounded queue of console commands.

pub mod context;
pub mod output_stage;
pub mod shared;
pub mod timing;

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, bounded};
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use acsync_shared::{ByteStructLen, Mode, SetpointMessage};

use crate::app::run_application;
use crate::console::{Command, run_console};
use crate::logging::{activity_thread_name, init_logging};
use crate::measurement::Measurements;
use crate::peripheral::{Acquisition, Actuation, CycleSync};
use crate::role::{CycleIo, Role, RoleKind};
use crate::socket::{Link, LinkConfig, OnReceive};

pub use context::ControllerCtx;
pub use shared::{SharedState, TelemetrySnapshot};

/// Received records waiting for the next cycle. When full, the oldest
/// record is dropped so the most recent one always reaches the role.
const INBOX_DEPTH: usize = 8;

/// Console commands waiting for the next cycle
const COMMAND_DEPTH: usize = 16;

/// Configuration of one node: operation context plus the role it plays
#[derive(Serialize, Deserialize, Debug)]
pub struct Controller {
    pub ctx: ControllerCtx,
    pub role: Box<dyn Role>,
}

/// Board and link handles owned by a node
pub struct NodeIo {
    pub acquisition: Box<dyn Acquisition>,
    pub actuation: Box<dyn Actuation>,
    pub link: Box<dyn Link>,
    pub sync: Box<dyn CycleSync>,
}

/// Streams used by the console and application activities
pub struct ConsoleIo {
    pub input: Box<dyn Read + Send>,
    pub output: Box<dyn Write + Send>,
    pub telemetry: Box<dyn Write + Send>,
}

impl Controller {
    pub fn new(ctx: ControllerCtx, role: Box<dyn Role>) -> Self {
        Self { ctx, role }
    }

    /// Initialize the role, open the link and join the cycle synchronization.
    ///
    /// The returned node can be cycled by hand or started with [`Node::run`].
    pub fn prepare(mut self, io: NodeIo) -> Result<Node, String> {
        let NodeIo {
            acquisition,
            actuation,
            mut link,
            mut sync,
        } = io;

        self.ctx.validate()?;
        self.role.init(&self.ctx)?;
        let kind = self.role.kind();
        info!("Preparing {} node", kind.label());

        let shared = Arc::new(SharedState::new());
        let inbox = Arc::new(ArrayQueue::<SetpointMessage>::new(INBOX_DEPTH));
        let (command_tx, command_rx) = bounded::<Command>(COMMAND_DEPTH);

        // Runs on the link's thread; only decodes and hands off
        let rx_shared = shared.clone();
        let rx_inbox = inbox.clone();
        let on_receive: OnReceive = Box::new(move |bytes: &[u8]| {
            match SetpointMessage::from_bytes(bytes) {
                Some(msg) => {
                    if rx_inbox.force_push(msg).is_some() {
                        rx_shared.note_rx_dropped();
                    }
                }
                None => rx_shared.note_rx_dropped(),
            }
        });

        if link.is_open() {
            link.close();
        }
        link.open(
            LinkConfig {
                message_size: SetpointMessage::BYTE_LEN,
                speed_hz: self.ctx.link_speed_hz,
            },
            on_receive,
        )?;

        self.role.start_sync(sync.as_mut(), &self.ctx)?;

        let critical = CriticalLoop {
            role: self.role,
            measurements: Measurements::new(),
            acquisition,
            actuation,
            link,
            _sync: sync,
            inbox,
            commands: command_rx,
            shared: shared.clone(),
        };

        Ok(Node {
            critical,
            shared,
            commands: command_tx,
            ctx: self.ctx,
            kind,
        })
    }
}

/// Everything the critical activity touches
struct CriticalLoop {
    role: Box<dyn Role>,
    measurements: Measurements,
    acquisition: Box<dyn Acquisition>,
    actuation: Box<dyn Actuation>,
    link: Box<dyn Link>,
    // Held so the board keeps the sync signal configured
    _sync: Box<dyn CycleSync>,
    inbox: Arc<ArrayQueue<SetpointMessage>>,
    commands: Receiver<Command>,
    shared: Arc<SharedState>,
}

impl CriticalLoop {
    fn cycle(&mut self) {
        let sample = *self.measurements.acquire(self.acquisition.as_mut());
        self.role.on_measurement(&sample);

        // Only what was queued at the start of the cycle, in arrival order
        for _ in 0..self.inbox.len() {
            let Some(msg) = self.inbox.pop() else { break };
            self.role.on_protocol_message(&msg, &self.shared);
        }
        for cmd in self.commands.try_iter() {
            self.role.on_command(cmd, &self.shared);
        }

        let mut io = CycleIo {
            actuation: self.actuation.as_mut(),
            link: self.link.as_mut(),
            shared: &self.shared,
        };
        self.role.tick(&mut io);
    }

    fn halt(&mut self) {
        self.role.halt(self.actuation.as_mut());
        self.link.close();
    }
}

/// A prepared node
pub struct Node {
    critical: CriticalLoop,
    shared: Arc<SharedState>,
    commands: Sender<Command>,
    ctx: ControllerCtx,
    kind: RoleKind,
}

impl Node {
    /// Run exactly one control cycle on the calling thread
    pub fn cycle(&mut self) {
        self.critical.cycle();
    }

    /// Queue a command for the next cycle
    pub fn send(&self, cmd: Command) -> Result<(), String> {
        self.commands
            .try_send(cmd)
            .map_err(|e| format!("Command queue rejected {cmd:?}: {e}"))
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn ctx(&self) -> &ControllerCtx {
        &self.ctx
    }

    pub fn kind(&self) -> RoleKind {
        self.kind
    }

    pub fn role(&self) -> &dyn Role {
        self.critical.role.as_ref()
    }

    pub fn mode(&self) -> Mode {
        self.critical.role.mode()
    }

    /// Force the outputs off and close the link
    pub fn halt(&mut self) {
        self.critical.halt();
    }

    /// Start logging and spawn the three activities
    pub fn run(self, console: ConsoleIo) -> Result<RunHandle, String> {
        let log_path = init_logging(&self.ctx.op_dir, &self.ctx.op_name)?;
        info!("Logging to {}", log_path.display());

        let Node {
            mut critical,
            shared,
            commands,
            ctx,
            kind,
        } = self;
        let ConsoleIo {
            mut input,
            mut output,
            mut telemetry,
        } = console;

        let stop = Arc::new(AtomicBool::new(false));
        let period = Duration::from_nanos(ctx.dt_ns as u64);
        let app_period = Duration::from_millis(ctx.app_period_ms);
        let drain_pace = Duration::from_millis(ctx.drain_pace_ms);

        let critical_thread = {
            let stop = stop.clone();
            std::thread::Builder::new()
                .name(activity_thread_name("critical", kind))
                .spawn(move || {
                    prioritize_current_thread();
                    let mut timer = timing::CycleTimer::new(period);
                    let mut late = false;
                    while !stop.load(Ordering::Relaxed) {
                        critical.cycle();
                        let margin_ns = timer.wait_next();
                        critical.shared.note_cycle_margin(margin_ns);
                        // Warn once per run of late cycles
                        if margin_ns < 0 && !late {
                            warn!("Control cycle overran its period by {} ns", -margin_ns);
                        }
                        late = margin_ns < 0;
                    }
                    critical.halt();
                    info!("Critical activity stopped");
                })
                .map_err(|e| format!("Failed to spawn critical activity: {e}"))?
        };

        let app_thread = {
            let stop = stop.clone();
            let shared = shared.clone();
            std::thread::Builder::new()
                .name(activity_thread_name("application", kind))
                .spawn(move || {
                    if let Err(e) = run_application(
                        telemetry.as_mut(),
                        kind,
                        &shared,
                        app_period,
                        drain_pace,
                        &stop,
                    ) {
                        error!("Application output failed: {e}");
                    }
                })
                .map_err(|e| format!("Failed to spawn application activity: {e}"))?
        };

        let console_thread = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name(activity_thread_name("console", kind))
                .spawn(move || {
                    if let Err(e) =
                        run_console(input.as_mut(), output.as_mut(), kind, &shared, &commands)
                    {
                        error!("Console failed: {e}");
                    }
                })
                .map_err(|e| format!("Failed to spawn console activity: {e}"))?
        };

        info!("{} node running with {} ns period", kind.label(), ctx.dt_ns);

        Ok(RunHandle {
            stop,
            shared,
            critical: Some(critical_thread),
            app: Some(app_thread),
            console: Some(console_thread),
        })
    }
}

/// Handle to a running node
pub struct RunHandle {
    stop: Arc<AtomicBool>,
    shared: Arc<SharedState>,
    critical: Option<JoinHandle<()>>,
    app: Option<JoinHandle<()>>,
    console: Option<JoinHandle<()>>,
}

impl RunHandle {
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Whether the critical activity is still cycling
    pub fn is_running(&self) -> bool {
        self.critical.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Whether the console input has been closed
    pub fn console_finished(&self) -> bool {
        self.console.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Stop the activities and wait for the outputs to be forced off.
    ///
    /// A console blocked on input cannot be interrupted and is left detached.
    pub fn stop(mut self) -> Result<(), String> {
        self.stop.store(true, Ordering::Relaxed);

        let mut result = Ok(());
        if let Some(h) = self.critical.take() {
            if h.join().is_err() {
                result = Err("Critical activity panicked".to_string());
            }
        }
        if let Some(h) = self.app.take() {
            if h.join().is_err() && result.is_ok() {
                result = Err("Application activity panicked".to_string());
            }
        }
        if let Some(h) = self.console.take() {
            if h.is_finished() && h.join().is_err() && result.is_ok() {
                result = Err("Console activity panicked".to_string());
            }
        }
        result
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.critical.take() {
            let _ = h.join();
        }
    }
}

/// Pin the critical activity to the first core and raise its priority.
/// Not every platform allows this, so failures are only logged.
#[cfg(feature = "affinity")]
fn prioritize_current_thread() {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    // The first core is more likely to be a high-performance core
    // on a heterogeneous device
    if let Some(core) = core_ids.first() {
        if !core_affinity::set_for_current(*core) {
            warn!("Could not pin critical activity to core {}", core.id);
        }
    }
    if let Err(e) =
        thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max)
    {
        warn!("Could not raise critical activity priority: {e:?}");
    }
}

#[cfg(not(feature = "affinity"))]
fn prioritize_current_thread() {}
