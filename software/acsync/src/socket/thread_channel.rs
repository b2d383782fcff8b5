//! Link backed by a pair of bounded thread channels, with a receive worker
//! thread standing in for the transport's reception interrupt.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, bounded, select};
use tracing::{debug, info};

use super::{Link, LinkConfig, OnReceive};

/// Records buffered per direction before transmit starts failing
const DEPTH: usize = 16;

pub struct ThreadChannelLink {
    name: String,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    severed: Arc<AtomicBool>,
    cfg: Option<LinkConfig>,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadChannelLink {
    /// Two connected ends named `a` and `b` in logs
    pub fn pair(a: &str, b: &str) -> (Self, Self) {
        let (tx_ab, rx_ab) = bounded(DEPTH);
        let (tx_ba, rx_ba) = bounded(DEPTH);
        let severed = Arc::new(AtomicBool::new(false));
        (
            Self::new(a, tx_ab, rx_ba, severed.clone()),
            Self::new(b, tx_ba, rx_ab, severed),
        )
    }

    fn new(
        name: &str,
        tx: Sender<Vec<u8>>,
        rx: Receiver<Vec<u8>>,
        severed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            tx,
            rx,
            severed,
            cfg: None,
            stop: None,
            worker: None,
        }
    }

    /// Drop everything sent in either direction until restored
    pub fn set_severed(&self, severed: bool) {
        self.severed.store(severed, Ordering::Relaxed);
    }
}

impl Link for ThreadChannelLink {
    fn is_open(&self) -> bool {
        self.cfg.is_some()
    }

    fn open(&mut self, cfg: LinkConfig, mut on_receive: OnReceive) -> Result<(), String> {
        if self.is_open() {
            return Err(format!("Link {} is already open", self.name));
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let rx = self.rx.clone();
        let name = self.name.clone();
        let worker = std::thread::Builder::new()
            .name(format!("link-rx-{}", self.name))
            .spawn(move || {
                loop {
                    select! {
                        recv(rx) -> msg => match msg {
                            Ok(bytes) if bytes.len() == cfg.message_size => on_receive(&bytes),
                            Ok(bytes) => debug!(
                                "Link {name} dropped {}-byte record, expected {}",
                                bytes.len(),
                                cfg.message_size
                            ),
                            Err(_) => break,
                        },
                        recv(stop_rx) -> _ => break,
                    }
                }
            })
            .map_err(|e| format!("Failed to spawn receive worker for link {}: {e}", self.name))?;

        self.cfg = Some(cfg);
        self.stop = Some(stop_tx);
        self.worker = Some(worker);
        info!(
            "Opened link {} ({} byte records at {} Hz)",
            self.name, cfg.message_size, cfg.speed_hz
        );
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the stop sender wakes the worker
        self.stop = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            info!("Closed link {}", self.name);
        }
        self.cfg = None;
    }

    fn transmit(&mut self, msg: &[u8]) -> Result<(), String> {
        if !self.is_open() {
            return Err(format!("Unable to send before link {} is open", self.name));
        }
        if self.severed.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.tx
            .try_send(msg.to_vec())
            .map_err(|e| format!("Link {} failed to send: {e}", self.name))
    }
}

impl Drop for ThreadChannelLink {
    fn drop(&mut self) {
        self.close();
    }
}
