//! Configuration types

use crate::session::DEFAULT_MAX_QUEUE_LEN;
use crate::telemetry::LogConfig;
use serde::Deserialize;

/// Default socket read buffer, large enough for any frame on a 64k MTU link
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65536;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Passive-mode queue capacity
    pub max_queue_len: usize,
    /// Bytes read from the socket per frame
    pub recv_buffer_size: usize,
    /// Bind the socket to this interface instead of all of them
    pub interface: Option<String>,
    /// Put `interface` into promiscuous mode while the session is open
    pub promiscuous: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            interface: None,
            promiscuous: false,
        }
    }
}
