//! In-process socket backend
//!
//! Frames are injected by the test or caller instead of arriving from a NIC,
//! and transmitted frames are recorded rather than put on the wire.

use super::{RawSocket, RawSocketProvider};
use crate::{Error, Result};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A frame handed to [`RawSocket::send_to_interface`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub interface: String,
    pub frame: Vec<u8>,
}

#[derive(Debug, Default)]
struct Shared {
    interfaces: Vec<String>,
    inbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    sent: Vec<SentFrame>,
    opened: usize,
    closed: usize,
}

/// Provider whose sockets exchange frames with the owning process.
///
/// Clones share state, so a test can keep one clone to inject frames while
/// the session owns the other. Interface indexes are 1-based positions in
/// the configured interface list.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryProvider {
    pub fn new<I, S>(interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let shared = Shared {
            interfaces: interfaces.into_iter().map(Into::into).collect(),
            ..Default::default()
        };
        Self {
            shared: Arc::new(Mutex::new(shared)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a frame to the open socket. Returns false if none is open.
    pub fn inject(&self, frame: impl Into<Vec<u8>>) -> bool {
        match &self.lock().inbound {
            Some(tx) => tx.send(frame.into()).is_ok(),
            None => false,
        }
    }

    /// Frames transmitted so far, oldest first
    pub fn sent(&self) -> Vec<SentFrame> {
        self.lock().sent.clone()
    }

    /// Number of sockets opened
    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    /// Number of sockets closed
    pub fn closed(&self) -> usize {
        self.lock().closed
    }
}

impl RawSocketProvider for MemoryProvider {
    type Socket = MemorySocket;

    fn open(&mut self) -> Result<MemorySocket> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = self.lock();
        shared.opened += 1;
        shared.inbound = Some(tx);
        Ok(MemorySocket {
            id: shared.opened,
            inbound: rx,
            provider: self.clone(),
        })
    }

    fn list_interfaces(&self) -> Result<Vec<String>> {
        Ok(self.lock().interfaces.clone())
    }
}

/// Socket opened by a [`MemoryProvider`]
#[derive(Debug)]
pub struct MemorySocket {
    id: usize,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    provider: MemoryProvider,
}

impl MemorySocket {
    /// Sequence number of this socket among those opened by the provider, from 1
    pub fn id(&self) -> usize {
        self.id
    }

    fn record_send(&self, ifindex: i32, frame: &[u8]) -> Result<usize> {
        let mut shared = self.provider.lock();
        let interface = usize::try_from(ifindex)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| shared.interfaces.get(i))
            .cloned()
            .ok_or_else(|| Error::NoSuchInterface {
                name: format!("#{}", ifindex),
            })?;
        shared.sent.push(SentFrame {
            interface,
            frame: frame.to_vec(),
        });
        Ok(frame.len())
    }
}

impl RawSocket for MemorySocket {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.inbound.recv().await {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            None => Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory socket superseded",
            ))),
        }
    }

    async fn send_to_interface(&mut self, ifindex: i32, frame: &[u8]) -> Result<usize> {
        self.record_send(ifindex, frame)
    }

    fn interface_index(&self, name: &str) -> Result<i32> {
        self.provider
            .lock()
            .interfaces
            .iter()
            .position(|iface| iface == name)
            .map(|i| i as i32 + 1)
            .ok_or_else(|| Error::NoSuchInterface {
                name: name.to_string(),
            })
    }

    fn close(self) -> Result<()> {
        let mut shared = self.provider.lock();
        shared.closed += 1;
        shared.inbound = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inject_reaches_open_socket() {
        let mut provider = MemoryProvider::new(["eth0"]);
        assert!(!provider.inject(vec![1, 2, 3]));

        let mut socket = provider.open().unwrap();
        assert!(provider.inject(vec![1, 2, 3]));

        let mut buf = [0u8; 16];
        let len = socket.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_recv_truncates_to_buffer() {
        let mut provider = MemoryProvider::new(["eth0"]);
        let mut socket = provider.open().unwrap();
        provider.inject(vec![7u8; 32]);

        let mut buf = [0u8; 8];
        assert_eq!(socket.recv(&mut buf).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_send_records_frame() {
        let mut provider = MemoryProvider::new(["lo", "eth0"]);
        let mut socket = provider.open().unwrap();

        let ifindex = socket.interface_index("eth0").unwrap();
        assert_eq!(ifindex, 2);
        socket.send_to_interface(ifindex, &[0xaa; 14]).await.unwrap();

        assert_eq!(
            provider.sent(),
            vec![SentFrame {
                interface: "eth0".into(),
                frame: vec![0xaa; 14],
            }]
        );
        assert!(socket.send_to_interface(9, &[0; 14]).await.is_err());
    }

    #[test]
    fn test_unknown_interface() {
        let mut provider = MemoryProvider::new(["eth0"]);
        let socket = provider.open().unwrap();
        assert!(matches!(
            socket.interface_index("wlan0"),
            Err(Error::NoSuchInterface { name }) if name == "wlan0"
        ));
    }

    #[test]
    fn test_open_close_counters() {
        let mut provider = MemoryProvider::new(["eth0"]);
        let first = provider.open().unwrap();
        assert_eq!(first.id(), 1);
        first.close().unwrap();
        let second = provider.open().unwrap();
        assert_eq!(second.id(), 2);

        assert_eq!(provider.opened(), 2);
        assert_eq!(provider.closed(), 1);
        assert_eq!(provider.list_interfaces().unwrap(), vec!["eth0"]);
    }
}
