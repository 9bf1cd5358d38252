//! Raw packet socket backends
//!
//! The session layer talks to sockets only through [`RawSocketProvider`] and
//! [`RawSocket`]:
//! - AF_PACKET: Linux raw packet sockets
//! - Memory: in-process frames, for tests and dry runs

mod af_packet;
mod memory;

pub use af_packet::{AfPacketProvider, AfPacketSocket};
pub use memory::{MemoryProvider, MemorySocket, SentFrame};

use crate::Result;
use std::future::Future;

/// Source of raw packet sockets (family packet, type raw, all protocols)
pub trait RawSocketProvider: Send + 'static {
    type Socket: RawSocket;

    /// Open a new socket
    fn open(&mut self) -> Result<Self::Socket>;

    /// Names of the host's network interfaces
    fn list_interfaces(&self) -> Result<Vec<String>>;
}

/// An open raw packet socket
pub trait RawSocket: Send + 'static {
    /// Receive one frame into the provided buffer, returning its length
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Transmit a complete link-layer frame on the given interface
    fn send_to_interface(
        &mut self,
        ifindex: i32,
        frame: &[u8],
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Resolve an interface name to its index
    fn interface_index(&self, name: &str) -> Result<i32>;

    /// Release the socket
    fn close(self) -> Result<()>;
}
