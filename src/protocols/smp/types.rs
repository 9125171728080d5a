use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read = 0,
    ReadRsp = 1,
    Write = 2,
    WriteRsp = 3,
}

impl Operation {
    /// The operation a device answers this request operation with.
    pub fn response(self) -> Self {
        match self {
            Operation::Read | Operation::ReadRsp => Operation::ReadRsp,
            Operation::Write | Operation::WriteRsp => Operation::WriteRsp,
        }
    }

    pub fn is_response(self) -> bool {
        matches!(self, Operation::ReadRsp | Operation::WriteRsp)
    }
}

impl TryFrom<u8> for Operation {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Read),
            1 => Ok(Self::ReadRsp),
            2 => Ok(Self::Write),
            3 => Ok(Self::WriteRsp),
            _ => Err(Error::Protocol(format!("Invalid operation: {}", value))),
        }
    }
}

/// Header version field. V2 responses report errors as `err: {group, rc}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    V1 = 0,
    #[default]
    V2 = 1,
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::V1),
            1 => Ok(Self::V2),
            _ => Err(Error::Protocol(format!("Invalid protocol version: {}", value))),
        }
    }
}

pub mod group {
    pub const OS: u16 = 0;
    pub const IMAGE: u16 = 1;
    pub const FS: u16 = 8;
    pub const MGMT_EX: u16 = 80;
}
