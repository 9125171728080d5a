use bytes::{BufMut, BytesMut};

use super::types::{Operation, ProtocolVersion};
use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = 8;

/// `res:3 | ver:2 | op:3`, flags, length, group, sequence, command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub op: Operation,
    pub version: ProtocolVersion,
    pub flags: u8,
    pub length: u16,
    pub group: u16,
    pub sequence: u8,
    pub command: u8,
}

impl Header {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(((self.version as u8) << 3) | self.op as u8);
        buf.put_u8(self.flags);
        buf.put_u16(self.length);
        buf.put_u16(self.group);
        buf.put_u8(self.sequence);
        buf.put_u8(self.command);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "Header too short: {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            op: Operation::try_from(bytes[0] & 0x07)?,
            version: ProtocolVersion::try_from((bytes[0] >> 3) & 0x03)?,
            flags: bytes[1],
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
            group: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: bytes[6],
            command: bytes[7],
        })
    }
}
