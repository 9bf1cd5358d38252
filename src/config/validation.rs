//! Configuration validation

use super::Config;
use crate::protocol::ethernet::MIN_FRAME_SIZE;

/// Queue capacities above this are accepted but worth a warning
const LARGE_QUEUE_LEN: usize = 100_000;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_session(config, &mut result);
    validate_logging(config, &mut result);

    result
}

fn validate_session(config: &Config, result: &mut ValidationResult) {
    let session = &config.session;

    if session.max_queue_len == 0 {
        result.error("session.max_queue_len: must be at least 1, every frame would be dropped");
    } else if session.max_queue_len > LARGE_QUEUE_LEN {
        result.warn(format!(
            "session.max_queue_len: {} frames may hold a lot of memory",
            session.max_queue_len
        ));
    }

    if session.recv_buffer_size < MIN_FRAME_SIZE {
        result.error(format!(
            "session.recv_buffer_size: {} is smaller than an Ethernet header ({} bytes)",
            session.recv_buffer_size, MIN_FRAME_SIZE
        ));
    }

    if session.promiscuous && session.interface.is_none() {
        result.error("session.promiscuous: requires session.interface");
    }

    if let Some(name) = &session.interface {
        if name.is_empty() {
            result.error("session.interface: must not be empty");
        }
    }
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let logging = &config.logging;

    if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            logging.level
        ));
    }

    if !LOG_FORMATS.contains(&logging.format.as_str()) {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            logging.format
        ));
    }
}
