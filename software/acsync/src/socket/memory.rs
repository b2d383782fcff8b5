//! Link whose receive callback runs synchronously inside the peer's transmit.
//!
//! Delivery order is fully deterministic, which makes it the link of choice
//! for stepping two controllers cycle by cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{Link, LinkConfig, OnReceive};

type CallbackSlot = Arc<Mutex<Option<OnReceive>>>;

pub struct MemoryLink {
    local: CallbackSlot,
    peer: CallbackSlot,
    severed: Arc<AtomicBool>,
    cfg: Option<LinkConfig>,
}

impl MemoryLink {
    /// Two connected ends
    pub fn pair() -> (Self, Self) {
        let a = CallbackSlot::default();
        let b = CallbackSlot::default();
        let severed = Arc::new(AtomicBool::new(false));
        (
            Self {
                local: a.clone(),
                peer: b.clone(),
                severed: severed.clone(),
                cfg: None,
            },
            Self {
                local: b,
                peer: a,
                severed,
                cfg: None,
            },
        )
    }

    /// Handle for cutting and restoring the wire from outside
    pub fn wire(&self) -> Wire {
        Wire {
            severed: self.severed.clone(),
        }
    }
}

/// Shared cut/restore switch for both directions of a link pair
#[derive(Clone, Debug)]
pub struct Wire {
    severed: Arc<AtomicBool>,
}

impl Wire {
    /// Silently drop everything sent from now on
    pub fn sever(&self) {
        self.severed.store(true, Ordering::Relaxed);
    }

    pub fn restore(&self) {
        self.severed.store(false, Ordering::Relaxed);
    }
}

impl Link for MemoryLink {
    fn is_open(&self) -> bool {
        self.cfg.is_some()
    }

    fn open(&mut self, cfg: LinkConfig, on_receive: OnReceive) -> Result<(), String> {
        if self.is_open() {
            return Err("Memory link is already open".to_string());
        }
        let mut slot = self
            .local
            .lock()
            .map_err(|_| "Memory link callback lock poisoned".to_string())?;
        *slot = Some(on_receive);
        self.cfg = Some(cfg);
        Ok(())
    }

    fn close(&mut self) {
        if let Ok(mut slot) = self.local.lock() {
            *slot = None;
        }
        self.cfg = None;
    }

    fn transmit(&mut self, msg: &[u8]) -> Result<(), String> {
        let cfg = self
            .cfg
            .ok_or_else(|| "Unable to send before link is open".to_string())?;
        if msg.len() != cfg.message_size {
            return Err(format!(
                "Record of {} bytes does not match link record size {}",
                msg.len(),
                cfg.message_size
            ));
        }
        if self.severed.load(Ordering::Relaxed) {
            return Ok(());
        }

        let mut slot = self
            .peer
            .lock()
            .map_err(|_| "Memory link callback lock poisoned".to_string())?;
        if let Some(on_receive) = slot.as_mut() {
            on_receive(msg);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: LinkConfig = LinkConfig {
        message_size: 4,
        speed_hz: 1_000_000,
    };

    #[test]
    fn delivers_to_peer_only() {
        let (mut a, mut b) = MemoryLink::pair();
        let got_a = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
        let got_b = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));

        let sink = got_a.clone();
        a.open(CFG, Box::new(move |m| sink.lock().unwrap().push(m.to_vec())))
            .unwrap();
        let sink = got_b.clone();
        b.open(CFG, Box::new(move |m| sink.lock().unwrap().push(m.to_vec())))
            .unwrap();

        a.transmit(&[1, 2, 3, 4]).unwrap();
        assert!(got_a.lock().unwrap().is_empty());
        assert_eq!(*got_b.lock().unwrap(), vec![vec![1, 2, 3, 4]]);

        assert!(a.transmit(&[1, 2, 3]).is_err());
        assert!(a.open(CFG, Box::new(|_| {})).is_err());
    }

    #[test]
    fn severed_wire_drops_silently() {
        let (mut a, mut b) = MemoryLink::pair();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        a.open(CFG, Box::new(|_| {})).unwrap();
        b.open(CFG, Box::new(move |_| *c.lock().unwrap() += 1))
            .unwrap();

        let wire = a.wire();
        wire.sever();
        a.transmit(&[0; 4]).unwrap();
        assert_eq!(*count.lock().unwrap(), 0);

        wire.restore();
        a.transmit(&[0; 4]).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn closed_end_cannot_send() {
        let (mut a, _b) = MemoryLink::pair();
        assert!(a.transmit(&[0; 4]).is_err());
        a.open(CFG, Box::new(|_| {})).unwrap();
        a.close();
        assert!(!a.is_open());
        assert!(a.transmit(&[0; 4]).is_err());
    }
}
