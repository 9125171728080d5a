use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("CRC mismatch")]
    CrcMismatch,

    #[error("Sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: u8, actual: u8 },

    #[error("Connection faulted, reconnect required")]
    ConnectionFaulted,

    #[error("Device error: group {group}, rc {rc}{}", fmt_reason(.reason))]
    Device {
        group: u16,
        rc: i64,
        reason: Option<String>,
    },

    #[error("Transfer failed at offset {offset}: {source}")]
    Transfer {
        offset: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("CBOR error: {0}")]
    Cbor(String),

    #[error("Hex file error: {0}")]
    HexFile(#[from] ihex::ReaderError),

    #[error("Firmware image spans {0} bytes, more than the {1} byte limit")]
    FirmwareTooLarge(u64, u64),

    #[error("Verification failed: expected {expected:#010x}, got {actual:#010x}")]
    VerificationFailed { expected: u32, actual: u32 },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Channel,
    Timeout,
    Protocol,
    Device,
    Transfer,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Channel(_) | Error::Serial(_) | Error::ChannelClosed | Error::NotConnected => {
                ErrorKind::Channel
            }
            Error::Timeout => ErrorKind::Timeout,
            Error::Protocol(_)
            | Error::CrcMismatch
            | Error::SequenceMismatch { .. }
            | Error::ConnectionFaulted => ErrorKind::Protocol,
            Error::Device { .. } => ErrorKind::Device,
            Error::Transfer { .. } => ErrorKind::Transfer,
            _ => ErrorKind::Other,
        }
    }

    /// Channel and protocol failures leave the link in an unknown framing
    /// state; everything else keeps the connection usable. A transfer
    /// failure is fatal when its cause is.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Transfer { source, .. } => source.is_fatal(),
            _ => matches!(self.kind(), ErrorKind::Channel | ErrorKind::Protocol),
        }
    }

    pub(crate) fn transfer(offset: u64, source: Error) -> Self {
        Error::Transfer {
            offset,
            source: Box::new(source),
        }
    }

    pub(crate) fn cbor(e: impl std::fmt::Display) -> Self {
        Error::Cbor(e.to_string())
    }
}

fn fmt_reason(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_kinds() {
        assert_eq!(Error::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(Error::CrcMismatch.kind(), ErrorKind::Protocol);
        assert_eq!(Error::ChannelClosed.kind(), ErrorKind::Channel);
        let device = Error::Device { group: 8, rc: 5, reason: None };
        assert_eq!(device.kind(), ErrorKind::Device);
        assert!(!device.is_fatal());
        assert!(Error::SequenceMismatch { expected: 1, actual: 2 }.is_fatal());
    }

    #[test]
    fn transfer_error_keeps_offset_and_cause() {
        let err = Error::transfer(600, Error::Timeout);
        match &err {
            Error::Transfer { offset, source } => {
                assert_eq!(*offset, 600);
                assert_eq!(source.kind(), ErrorKind::Timeout);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "Transfer failed at offset 600: Timeout");
    }

    #[test]
    fn transfer_error_is_as_fatal_as_its_cause() {
        assert!(!Error::transfer(0, Error::Timeout).is_fatal());
        assert!(!Error::transfer(0, Error::Device { group: 8, rc: 1, reason: None }).is_fatal());
        assert!(Error::transfer(0, Error::SequenceMismatch { expected: 0, actual: 3 }).is_fatal());
        assert!(Error::transfer(300, Error::ChannelClosed).is_fatal());
        assert!(!Error::Configuration("too large".into()).is_fatal());
    }

    #[test]
    fn device_error_message_includes_reason() {
        let err = Error::Device { group: 1, rc: 3, reason: Some("busy".into()) };
        assert_eq!(err.to_string(), "Device error: group 1, rc 3 (busy)");
    }
}
