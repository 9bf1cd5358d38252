//! Session service task
//!
//! One task owns the [`Session`]. Client requests arrive over a command
//! channel and inbound frames over the socket; the task handles both in the
//! order it receives them, so session state is never shared.

use super::{Mode, Opened, QueueStats, RawFrame, Session, Status};
use crate::capture::RawSocketProvider;
use crate::config::SessionConfig;
use crate::protocol::DecodedFrame;
use crate::{Error, Result};
use std::io;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const COMMAND_CHANNEL_SIZE: usize = 64;

type Reply<T> = oneshot::Sender<Result<T>>;
type Predicate = Box<dyn Fn(&DecodedFrame) -> bool + Send>;

enum Command {
    Open {
        mode: Mode,
        reply: Reply<Opened>,
    },
    Close {
        reply: Reply<()>,
    },
    Send {
        interface: String,
        frame: Vec<u8>,
        reply: Reply<()>,
    },
    Receive {
        count: usize,
        reply: Reply<Vec<RawFrame>>,
    },
    ReceiveParsed {
        predicate: Predicate,
        count: usize,
        reply: Reply<Vec<DecodedFrame>>,
    },
    Status {
        reply: Reply<Status>,
    },
    Stats {
        reply: Reply<QueueStats>,
    },
    Interfaces {
        reply: Reply<Vec<String>>,
    },
}

/// Cloneable handle to a session running on its own task.
///
/// The task stops, closing any open socket, once every handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Start a session task on the current tokio runtime
    pub fn spawn<P: RawSocketProvider>(provider: P, config: &SessionConfig) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let session = Session::new(provider, config.max_queue_len);
        tokio::spawn(run(session, rx, config.recv_buffer_size));
        Self { commands }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::ServiceStopped)?;
        rx.await.map_err(|_| Error::ServiceStopped)?
    }

    pub async fn open(&self, mode: Mode) -> Result<Opened> {
        self.request(|reply| Command::Open { mode, reply }).await
    }

    pub async fn close(&self) -> Result<()> {
        self.request(|reply| Command::Close { reply }).await
    }

    pub async fn send(&self, interface: impl Into<String>, frame: impl Into<Vec<u8>>) -> Result<()> {
        let interface = interface.into();
        let frame = frame.into();
        self.request(|reply| Command::Send {
            interface,
            frame,
            reply,
        })
        .await
    }

    pub async fn receive(&self, count: usize) -> Result<Vec<RawFrame>> {
        self.request(|reply| Command::Receive { count, reply }).await
    }

    pub async fn receive_parsed<F>(&self, predicate: F, count: usize) -> Result<Vec<DecodedFrame>>
    where
        F: Fn(&DecodedFrame) -> bool + Send + 'static,
    {
        let predicate: Predicate = Box::new(predicate);
        self.request(|reply| Command::ReceiveParsed {
            predicate,
            count,
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<Status> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub async fn interfaces(&self) -> Result<Vec<String>> {
        self.request(|reply| Command::Interfaces { reply }).await
    }
}

async fn run<P: RawSocketProvider>(
    mut session: Session<P>,
    mut commands: mpsc::Receiver<Command>,
    recv_buffer_size: usize,
) {
    let mut buf = vec![0u8; recv_buffer_size];

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut session, command).await,
                None => break,
            },
            result = session.recv_inbound(&mut buf) => match result {
                Ok(len) => session.deliver(buf[..len].to_vec()),
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                // Anything else would fail again on the next read
                Err(e) => {
                    warn!("Receive error, closing session: {}", e);
                    if let Err(e) = session.close() {
                        warn!("Failed to close session: {}", e);
                    }
                }
            },
        }
    }

    if session.status() == Status::Open {
        if let Err(e) = session.close() {
            warn!("Failed to close session: {}", e);
        }
    }
    debug!("Session service stopped");
}

async fn handle_command<P: RawSocketProvider>(session: &mut Session<P>, command: Command) {
    // A dropped reply receiver means the caller gave up; nothing to do.
    match command {
        Command::Open { mode, reply } => {
            let _ = reply.send(session.open(mode));
        }
        Command::Close { reply } => {
            let _ = reply.send(session.close());
        }
        Command::Send {
            interface,
            frame,
            reply,
        } => {
            let _ = reply.send(session.send(&interface, &frame).await);
        }
        Command::Receive { count, reply } => {
            let _ = reply.send(session.receive(count));
        }
        Command::ReceiveParsed {
            predicate,
            count,
            reply,
        } => {
            let _ = reply.send(session.receive_parsed(|frame| predicate(frame), count));
        }
        Command::Status { reply } => {
            let _ = reply.send(Ok(session.status()));
        }
        Command::Stats { reply } => {
            let _ = reply.send(Ok(session.stats()));
        }
        Command::Interfaces { reply } => {
            let _ = reply.send(session.interfaces());
        }
    }
}
