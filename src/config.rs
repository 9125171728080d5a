use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocols::smp::ProtocolVersion;
use crate::protocols::serial::{FRAGMENT_OVERHEAD, MAX_LINE_LENGTH};

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Size of the device's receive buffer for one encoded frame.
    pub mtu: usize,
    /// Longest wire fragment the link carries.
    pub line_length: usize,
    pub timeout: Duration,
    pub read_timeout: Duration,
    pub read_size: usize,
    /// Upper bound on upload chunk size, below the MTU-derived budget.
    pub chunk_size: Option<usize>,
    pub max_retries: usize,
    pub version: ProtocolVersion,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            mtu: 512,
            line_length: 128,
            timeout: Duration::from_millis(2500),
            read_timeout: Duration::from_millis(50),
            read_size: 256,
            chunk_size: None,
            max_retries: 3,
            version: ProtocolVersion::V2,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn with_line_length(mut self, line_length: usize) -> Self {
        self.line_length = line_length;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_read_size(mut self, size: usize) -> Self {
        self.read_size = size;
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.line_length <= FRAGMENT_OVERHEAD {
            return Err(Error::Configuration(format!(
                "Line length must exceed {} bytes",
                FRAGMENT_OVERHEAD
            )));
        }

        if self.line_length > MAX_LINE_LENGTH {
            return Err(Error::Configuration(format!(
                "Line length must not exceed {} bytes",
                MAX_LINE_LENGTH
            )));
        }

        if self.mtu < self.line_length {
            return Err(Error::Configuration(
                "MTU must hold at least one full line".into(),
            ));
        }

        if self.timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(Error::Configuration("Timeouts must be non-zero".into()));
        }

        if self.read_size == 0 {
            return Err(Error::Configuration("Read size must be non-zero".into()));
        }

        if self.chunk_size == Some(0) {
            return Err(Error::Configuration("Chunk size must be non-zero".into()));
        }

        Ok(())
    }
}
