//! pktsock - raw packet sockets with decoded receive
//!
//! Opens a raw link-layer socket and hands inbound frames to callers either
//! through a bounded, tail-dropping queue (passive mode) or by pushing each
//! frame to an observer channel (active mode). Frames can be returned as raw
//! bytes or decoded into their Ethernet / IPv4 / TCP / UDP / ICMP headers.

pub mod capture;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod telemetry;

pub use error::{Error, Result};
