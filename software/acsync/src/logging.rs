//! Terminal and per-operation file logging.
//!
//! Node activities run on threads named `<activity>-<role>` (for example
//! `critical-server`), and both outputs print the thread name, so the lines
//! of the two nodes of a pair stay distinguishable when they share a process
//! and a log file.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

use crate::role::RoleKind;

/// Level used when `RUST_LOG` is unset or invalid
const DEFAULT_LEVEL: &str = "info";

type Timer = fmt::time::ChronoUtc;
type OpFileLayer = fmt::Layer<
    Registry,
    fmt::format::DefaultFields,
    fmt::format::Format<fmt::format::Full, Timer>,
    NonBlocking,
>;

static SINKS: OnceLock<Sinks> = OnceLock::new();

/// Background writers for both outputs; dropping a guard flushes its writer
struct Sinks {
    _terminal: WorkerGuard,
    op_file: Mutex<WorkerGuard>,
    op_file_handle: reload::Handle<OpFileLayer, Registry>,
}

impl Sinks {
    fn install(op_file: File) -> Result<Self, String> {
        let (terminal_writer, terminal_guard) = tracing_appender::non_blocking(std::io::stdout());
        let (file_writer, file_guard) = tracing_appender::non_blocking(op_file);
        let (file_layer, op_file_handle) = reload::Layer::new(op_file_layer(file_writer));

        let terminal_layer = fmt::layer()
            .with_timer(Timer::rfc_3339())
            .with_writer(terminal_writer)
            .with_thread_names(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(level_filter())
            .with(terminal_layer)
            .try_init()
            .map_err(|e| format!("Logging already set up elsewhere in this process: {e}"))?;

        Ok(Self {
            _terminal: terminal_guard,
            op_file: Mutex::new(file_guard),
            op_file_handle,
        })
    }

    /// Point file output at a new operation's log
    fn switch_op_file(&self, op_file: File) -> Result<(), String> {
        let (writer, guard) = tracing_appender::non_blocking(op_file);
        let mut held = self
            .op_file
            .lock()
            .map_err(|_| "Operation log guard poisoned".to_string())?;
        self.op_file_handle
            .modify(|layer| *layer = op_file_layer(writer))
            .map_err(|e| format!("Unable to switch operation log: {e}"))?;
        // Previous writer flushes as its guard drops
        *held = guard;
        Ok(())
    }
}

fn op_file_layer(writer: NonBlocking) -> OpFileLayer {
    fmt::layer::<Registry>()
        .with_timer(Timer::rfc_3339())
        .with_writer(writer)
        .with_thread_names(true)
        .with_ansi(false)
}

fn level_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// `<op_dir>/logs/<op_name>.log`, created and opened for append
fn open_op_log(op_dir: &Path, op_name: &str) -> Result<(PathBuf, File), String> {
    let dir = op_dir.join("logs");
    fs::create_dir_all(&dir)
        .map_err(|e| format!("Unable to create log directory {}: {e}", dir.display()))?;
    let path = dir.join(format!("{op_name}.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Unable to open log file {}: {e}", path.display()))?;
    Ok((path, file))
}

/// Thread name for one of a node's activities, e.g. `critical-server`
pub fn activity_thread_name(activity: &str, kind: RoleKind) -> String {
    format!("{activity}-{}", kind.label().to_lowercase())
}

/// Log to the terminal and to `<op_dir>/logs/<op_name>.log`.
///
/// The first call installs the process-wide subscriber; later calls, such
/// as the second node of a pair in one process, only switch the file.
/// Returns the path of the log file.
pub fn init_logging(op_dir: &Path, op_name: &str) -> Result<PathBuf, String> {
    let (path, file) = open_op_log(op_dir, op_name)?;
    match SINKS.get() {
        Some(sinks) => sinks.switch_op_file(file)?,
        None => {
            let sinks = Sinks::install(file)?;
            // Only the call whose subscriber went live reaches here
            let _ = SINKS.set(sinks);
        }
    }
    Ok(path)
}
