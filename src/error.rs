use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("session already open")]
    AlreadyOpen,

    #[error("session not connected")]
    NotConnected,

    #[error("operation not supported in active mode")]
    Unsupported,

    #[error("no frames available, try again")]
    Eagain,

    #[error("frame too short: {len} bytes")]
    MessageTooShort { len: usize },

    #[error("interface {name} not found")]
    NoSuchInterface { name: String },

    #[error("session service stopped")]
    ServiceStopped,
}

pub type Result<T> = std::result::Result<T, Error>;
