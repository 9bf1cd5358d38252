//! Raw socket sessions
//!
//! A session is closed, open in passive mode (inbound frames are buffered in
//! a bounded [`SessionQueue`] and pulled with `receive`), or open in active
//! mode (inbound frames are pushed to an observer channel as they arrive).
//! A session never goes from one open mode to the other without closing.

pub mod queue;
pub mod service;

pub use queue::{Enqueue, QueueStats, RawFrame, SessionQueue, DEFAULT_MAX_QUEUE_LEN};
pub use service::SessionHandle;

use crate::capture::{RawSocket, RawSocketProvider};
use crate::protocol::ethernet::MIN_FRAME_SIZE;
use crate::protocol::DecodedFrame;
use crate::{Error, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receiving end of an active session's frame stream
pub type FrameReceiver = mpsc::UnboundedReceiver<RawFrame>;

/// Inbound delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Buffer frames for pull-based `receive`
    Passive,
    /// Push every frame to the observer returned by `open`
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Open,
    Closed,
}

/// Result of a successful `open`
#[derive(Debug)]
pub enum Opened {
    Passive,
    Active(FrameReceiver),
}

enum State<S> {
    Closed,
    Passive {
        queue: SessionQueue,
        socket: S,
    },
    Active {
        observer: mpsc::UnboundedSender<RawFrame>,
        socket: S,
    },
}

/// Session state machine over one raw socket at a time
pub struct Session<P: RawSocketProvider> {
    provider: P,
    state: State<P::Socket>,
    max_queue_len: usize,
}

impl<P: RawSocketProvider> Session<P> {
    pub fn new(provider: P, max_queue_len: usize) -> Self {
        Self {
            provider,
            state: State::Closed,
            max_queue_len,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Open socket, if any
    pub fn socket(&self) -> Option<&P::Socket> {
        match &self.state {
            State::Closed => None,
            State::Passive { socket, .. } | State::Active { socket, .. } => Some(socket),
        }
    }

    pub fn status(&self) -> Status {
        match self.state {
            State::Closed => Status::Closed,
            _ => Status::Open,
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        match self.state {
            State::Closed => None,
            State::Passive { .. } => Some(Mode::Passive),
            State::Active { .. } => Some(Mode::Active),
        }
    }

    /// Queue counters; all zero unless open in passive mode
    pub fn stats(&self) -> QueueStats {
        match &self.state {
            State::Passive { queue, .. } => queue.stats(),
            _ => QueueStats::default(),
        }
    }

    pub fn open(&mut self, mode: Mode) -> Result<Opened> {
        if !matches!(self.state, State::Closed) {
            return Err(Error::AlreadyOpen);
        }

        let socket = self.provider.open()?;
        let opened = match mode {
            Mode::Passive => {
                self.state = State::Passive {
                    queue: SessionQueue::new(self.max_queue_len),
                    socket,
                };
                Opened::Passive
            }
            Mode::Active => {
                let (observer, rx) = mpsc::unbounded_channel();
                self.state = State::Active { observer, socket };
                Opened::Active(rx)
            }
        };

        info!("Session opened ({:?} mode)", mode);
        Ok(opened)
    }

    /// Close the socket and discard any queued frames.
    ///
    /// The session is closed afterwards even if the provider reports an error.
    pub fn close(&mut self) -> Result<()> {
        let socket = match std::mem::replace(&mut self.state, State::Closed) {
            State::Closed => return Err(Error::NotConnected),
            State::Passive { queue, socket } => {
                let stats = queue.stats();
                info!(
                    "Session closed: {} queued frames discarded, serviced={}, dropped={}",
                    stats.queue_length, stats.serviced, stats.dropped
                );
                socket
            }
            State::Active { socket, .. } => {
                info!("Session closed");
                socket
            }
        };
        socket.close()
    }

    /// Transmit `frame` on the named interface
    pub async fn send(&mut self, interface: &str, frame: &[u8]) -> Result<()> {
        if frame.len() < MIN_FRAME_SIZE {
            return Err(Error::MessageTooShort { len: frame.len() });
        }

        let socket = match &mut self.state {
            State::Closed => return Err(Error::NotConnected),
            State::Passive { socket, .. } | State::Active { socket, .. } => socket,
        };

        let ifindex = socket.interface_index(interface)?;
        let sent = socket.send_to_interface(ifindex, frame).await?;
        debug!("Sent {} bytes on {} (ifindex {})", sent, interface, ifindex);
        Ok(())
    }

    /// Pull up to `count` raw frames from the queue.
    ///
    /// Fewer than `count` frames is success; [`Error::Eagain`] means none
    /// were available.
    pub fn receive(&mut self, count: usize) -> Result<Vec<RawFrame>> {
        let frames = self.queue_mut()?.dequeue(count);
        if frames.is_empty() {
            return Err(Error::Eagain);
        }
        Ok(frames)
    }

    /// Pull and decode frames until `count` satisfy `predicate` or the queue
    /// runs dry. Frames that do not match are consumed.
    pub fn receive_parsed<F>(&mut self, predicate: F, count: usize) -> Result<Vec<DecodedFrame>>
    where
        F: FnMut(&DecodedFrame) -> bool,
    {
        let frames = self.queue_mut()?.dequeue_matching(predicate, count);
        if frames.is_empty() {
            return Err(Error::Eagain);
        }
        Ok(frames)
    }

    fn queue_mut(&mut self) -> Result<&mut SessionQueue> {
        match &mut self.state {
            State::Closed => Err(Error::NotConnected),
            State::Active { .. } => Err(Error::Unsupported),
            State::Passive { queue, .. } => Ok(queue),
        }
    }

    /// Hand an inbound frame to the session.
    ///
    /// Passive: queued, or silently dropped when the queue is full.
    /// Active: forwarded to the observer as-is. Closed: discarded.
    pub fn deliver(&mut self, frame: RawFrame) {
        match &mut self.state {
            State::Closed => {}
            State::Passive { queue, .. } => {
                queue.enqueue(frame);
            }
            State::Active { observer, .. } => {
                if observer.send(frame).is_err() {
                    debug!("Observer gone, inbound frame discarded");
                }
            }
        }
    }

    /// Wait for the next inbound frame on the open socket.
    ///
    /// Never completes while the session is closed.
    pub async fn recv_inbound(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.state {
            State::Closed => std::future::pending().await,
            State::Passive { socket, .. } | State::Active { socket, .. } => socket.recv(buf).await,
        }
    }

    pub fn interfaces(&self) -> Result<Vec<String>> {
        self.provider.list_interfaces()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MemoryProvider;
    use crate::protocol::ProtocolTag;

    fn session() -> (Session<MemoryProvider>, MemoryProvider) {
        let provider = MemoryProvider::new(["lo", "eth0"]);
        (Session::new(provider.clone(), 3), provider)
    }

    fn frame(ethertype: u16, fill: u8) -> RawFrame {
        let mut f = vec![fill; 12];
        f.extend_from_slice(&ethertype.to_be_bytes());
        f.extend_from_slice(b"test");
        f
    }

    #[test]
    fn test_initial_state() {
        let (session, _) = session();
        assert_eq!(session.status(), Status::Closed);
        assert_eq!(session.mode(), None);
        assert_eq!(session.stats(), QueueStats::default());
        assert!(session.socket().is_none());
    }

    #[test]
    fn test_open_passive_and_close() {
        let (mut session, provider) = session();
        assert!(matches!(session.open(Mode::Passive), Ok(Opened::Passive)));
        assert_eq!(session.status(), Status::Open);
        assert_eq!(session.mode(), Some(Mode::Passive));
        assert_eq!(session.stats().max_queue_length, 3);

        session.close().unwrap();
        assert_eq!(session.status(), Status::Closed);
        assert_eq!(provider.closed(), 1);
    }

    #[test]
    fn test_open_twice_keeps_first_socket() {
        let (mut session, provider) = session();
        session.open(Mode::Passive).unwrap();
        assert!(matches!(session.open(Mode::Active), Err(Error::AlreadyOpen)));

        assert_eq!(session.mode(), Some(Mode::Passive));
        assert_eq!(session.socket().map(|s| s.id()), Some(1));
        assert_eq!(provider.opened(), 1);
    }

    #[test]
    fn test_close_when_closed() {
        let (mut session, _) = session();
        assert!(matches!(session.close(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_receive_when_closed() {
        let (mut session, _) = session();
        assert!(matches!(session.receive(1), Err(Error::NotConnected)));
        assert!(matches!(
            session.receive_parsed(|_| true, 1),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_receive_in_active_mode_unsupported() {
        let (mut session, _) = session();
        session.open(Mode::Active).unwrap();
        assert!(matches!(session.receive(1), Err(Error::Unsupported)));
        assert!(matches!(
            session.receive_parsed(|_| true, 1),
            Err(Error::Unsupported)
        ));
    }

    #[test]
    fn test_receive_empty_is_eagain() {
        let (mut session, _) = session();
        session.open(Mode::Passive).unwrap();
        assert!(matches!(session.receive(1), Err(Error::Eagain)));
        assert_eq!(session.stats().serviced, 0);
    }

    #[test]
    fn test_receive_partial_is_ok() {
        let (mut session, _) = session();
        session.open(Mode::Passive).unwrap();
        session.deliver(frame(0x0004, 1));
        session.deliver(frame(0x0004, 2));

        let frames = session.receive(5).unwrap();
        assert_eq!(frames, vec![frame(0x0004, 1), frame(0x0004, 2)]);
        assert!(matches!(session.receive(5), Err(Error::Eagain)));
    }

    #[test]
    fn test_passive_overflow_is_counted() {
        let (mut session, _) = session();
        session.open(Mode::Passive).unwrap();
        for i in 0..5 {
            session.deliver(frame(0x0004, i));
        }

        let stats = session.stats();
        assert_eq!(stats.queue_length, 3);
        assert_eq!(stats.dropped, 2);
        assert_eq!(session.receive(3).unwrap()[0], frame(0x0004, 0));
    }

    #[test]
    fn test_receive_parsed_no_match_drains() {
        let (mut session, _) = session();
        session.open(Mode::Passive).unwrap();
        session.deliver(frame(0x0004, 1));
        session.deliver(frame(0x0806, 2));

        let result = session.receive_parsed(|f| f.contains(ProtocolTag::Tcp), 1);
        assert!(matches!(result, Err(Error::Eagain)));

        let stats = session.stats();
        assert_eq!(stats.queue_length, 0);
        assert_eq!(stats.serviced, 2);
    }

    #[test]
    fn test_receive_parsed_match() {
        let (mut session, _) = session();
        session.open(Mode::Passive).unwrap();
        session.deliver(frame(0x0004, 1));
        session.deliver(frame(0x0806, 2));

        let frames = session
            .receive_parsed(
                |f| f.header(ProtocolTag::Dix).and_then(|h| h.uint("type")) == Some(0x0806),
                1,
            )
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, b"test");
    }

    #[test]
    fn test_active_mode_forwards_without_queueing() {
        let (mut session, _) = session();
        let Ok(Opened::Active(mut rx)) = session.open(Mode::Active) else {
            panic!("expected active observer");
        };

        for i in 0..5 {
            session.deliver(frame(0x0004, i));
        }
        for i in 0..5 {
            assert_eq!(rx.try_recv().unwrap(), frame(0x0004, i));
        }
        assert_eq!(session.stats(), QueueStats::default());
    }

    #[test]
    fn test_active_mode_observer_dropped() {
        let (mut session, _) = session();
        let opened = session.open(Mode::Active).unwrap();
        drop(opened);
        session.deliver(frame(0x0004, 1));
        assert_eq!(session.status(), Status::Open);
    }

    #[test]
    fn test_close_discards_queue_and_resets_stats() {
        let (mut session, _) = session();
        session.open(Mode::Passive).unwrap();
        session.deliver(frame(0x0004, 1));
        session.close().unwrap();

        session.open(Mode::Passive).unwrap();
        assert_eq!(
            session.stats(),
            QueueStats {
                max_queue_length: 3,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_deliver_while_closed_is_ignored() {
        let (mut session, _) = session();
        session.deliver(frame(0x0004, 1));
        session.open(Mode::Passive).unwrap();
        assert_eq!(session.stats().queue_length, 0);
    }

    #[tokio::test]
    async fn test_send_short_frame() {
        let (mut session, provider) = session();
        session.open(Mode::Passive).unwrap();

        let result = session.send("eth0", b"abc").await;
        assert!(matches!(result, Err(Error::MessageTooShort { len: 3 })));
        assert!(provider.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_when_closed() {
        let (mut session, _) = session();
        let result = session.send("eth0", &[0u8; 14]).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_unknown_interface() {
        let (mut session, provider) = session();
        session.open(Mode::Active).unwrap();

        let result = session.send("wlan0", &[0u8; 14]).await;
        assert!(matches!(result, Err(Error::NoSuchInterface { .. })));
        assert!(provider.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_on_interface() {
        let (mut session, provider) = session();
        session.open(Mode::Passive).unwrap();

        let out = frame(0x0800, 0xee);
        session.send("eth0", &out).await.unwrap();

        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].interface, "eth0");
        assert_eq!(sent[0].frame, out);
    }

    #[tokio::test]
    async fn test_recv_inbound_reads_socket() {
        let (mut session, provider) = session();
        session.open(Mode::Passive).unwrap();
        provider.inject(frame(0x0004, 7));

        let mut buf = [0u8; 64];
        let len = session.recv_inbound(&mut buf).await.unwrap();
        session.deliver(buf[..len].to_vec());
        assert_eq!(session.receive(1).unwrap(), vec![frame(0x0004, 7)]);
    }
}
