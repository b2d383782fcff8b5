//! Point-to-point message link between the two nodes.
//!
//! The link moves opaque fixed-size records. Framing, integrity checks and
//! retries belong to the implementation; the control core only sends and
//! receives whole `SetpointMessage` records.

pub mod memory;
pub mod thread_channel;

pub use memory::MemoryLink;
pub use thread_channel::ThreadChannelLink;

/// Called by the link, outside the control activity, each time a complete
/// record arrives. Must return quickly.
pub type OnReceive = Box<dyn FnMut(&[u8]) + Send>;

/// Link parameters fixed at open
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    /// Size of every record in both directions
    pub message_size: usize,

    /// Line rate requested from the transport
    pub speed_hz: u32,
}

/// Packetized link to the peer node
pub trait Link: Send {
    /// Check whether the link is already open
    fn is_open(&self) -> bool;

    /// Register the receive callback and start listening
    fn open(&mut self, cfg: LinkConfig, on_receive: OnReceive) -> Result<(), String>;

    /// Stop listening and release the callback
    fn close(&mut self);

    /// Start sending one record. Does not wait for the peer.
    fn transmit(&mut self, msg: &[u8]) -> Result<(), String>;
}
