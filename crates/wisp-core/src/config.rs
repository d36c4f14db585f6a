//! Core configuration

use crate::error::{NodeError, Result};
use std::time::Duration;
use wisp_files::DEFAULT_CHUNK_SIZE;
use wisp_transport::MAX_FRAME_SIZE;

/// Default pause after each chunk is sent
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(100);

/// Default time allowed for an outbound connection to open
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Room left in a frame for the chunk message envelope
const CHUNK_ENVELOPE_RESERVE: usize = 1024;

/// Core configuration
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Transfer configuration
    pub transfer: TransferConfig,

    /// Session configuration
    pub session: SessionConfig,
}

impl NodeConfig {
    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidConfig` describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        self.transfer.validate()?;
        self.session.validate()
    }
}

/// Transfer configuration
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Largest encrypted payload sent as a single message, and the size of
    /// every chunk but the last
    pub chunk_size: usize,

    /// Pause after each chunk
    pub chunk_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }
}

impl TransferConfig {
    /// Validate transfer settings
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidConfig` if the chunk size is zero or does
    /// not fit in a frame.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(NodeError::invalid_config("chunk_size must be non-zero"));
        }
        if self.chunk_size > MAX_FRAME_SIZE - CHUNK_ENVELOPE_RESERVE {
            return Err(NodeError::InvalidConfig(
                format!(
                    "chunk_size {} exceeds the frame limit of {} bytes",
                    self.chunk_size,
                    MAX_FRAME_SIZE - CHUNK_ENVELOPE_RESERVE
                )
                .into(),
            ));
        }
        Ok(())
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time allowed for an outbound connection to open
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Validate session settings
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidConfig` if the connect timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(NodeError::invalid_config("connect_timeout must be non-zero"));
        }
        Ok(())
    }
}
