//! File system group.

use std::collections::BTreeMap;

use bytes::Bytes;
use ciborium::Value;

use super::{Command, FromBody};
use crate::error::{Error, Result};
use crate::protocols::smp::{group, Body, Operation};

const CMD_FILE: u8 = 0;
const CMD_CHECKSUM: u8 = 2;

/// One chunk of a file upload. `len` goes with the first chunk only.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload<'a> {
    pub name: &'a str,
    pub off: u64,
    pub data: &'a [u8],
    pub len: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileUploadResponse {
    /// Offset the device expects next.
    pub off: Option<u64>,
    pub extra: BTreeMap<String, Value>,
}

impl Command for FileUpload<'_> {
    const GROUP: u16 = group::FS;
    const ID: u8 = CMD_FILE;
    const OP: Operation = Operation::Write;

    type Response = FileUploadResponse;

    fn body(&self) -> Body {
        let mut body = Body::new()
            .with("name", self.name)
            .with("off", self.off)
            .with("data", Value::Bytes(self.data.to_vec()));
        if let Some(len) = self.len {
            body.insert("len", len);
        }
        body
    }
}

impl FromBody for FileUploadResponse {
    fn from_body(mut body: Body) -> Result<Self> {
        Ok(Self {
            off: body.take_u64("off")?,
            extra: body.into_extra(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileDownload<'a> {
    pub name: &'a str,
    pub off: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileDownloadResponse {
    pub off: u64,
    pub data: Bytes,
    /// Total file length, sent with the first chunk.
    pub len: Option<u64>,
    pub extra: BTreeMap<String, Value>,
}

impl Command for FileDownload<'_> {
    const GROUP: u16 = group::FS;
    const ID: u8 = CMD_FILE;
    const OP: Operation = Operation::Read;

    type Response = FileDownloadResponse;

    fn body(&self) -> Body {
        Body::new().with("name", self.name).with("off", self.off)
    }
}

impl FromBody for FileDownloadResponse {
    fn from_body(mut body: Body) -> Result<Self> {
        Ok(Self {
            off: body.require_u64("off")?,
            data: body.take_bytes("data")?.unwrap_or_default(),
            len: body.take_u64("len")?,
            extra: body.into_extra(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileChecksum<'a> {
    pub name: &'a str,
    pub kind: &'a str,
    pub off: Option<u64>,
    pub len: Option<u64>,
}

impl<'a> FileChecksum<'a> {
    pub fn crc32(name: &'a str) -> Self {
        Self {
            name,
            kind: "crc32",
            off: None,
            len: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChecksumOutput {
    Integer(u64),
    Bytes(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileChecksumResponse {
    pub kind: String,
    pub off: u64,
    pub len: u64,
    pub output: ChecksumOutput,
    pub extra: BTreeMap<String, Value>,
}

impl Command for FileChecksum<'_> {
    const GROUP: u16 = group::FS;
    const ID: u8 = CMD_CHECKSUM;
    const OP: Operation = Operation::Read;

    type Response = FileChecksumResponse;

    fn body(&self) -> Body {
        let mut body = Body::new().with("name", self.name).with("type", self.kind);
        if let Some(off) = self.off {
            body.insert("off", off);
        }
        if let Some(len) = self.len {
            body.insert("len", len);
        }
        body
    }
}

impl FromBody for FileChecksumResponse {
    fn from_body(mut body: Body) -> Result<Self> {
        let output = match body.remove("output") {
            Some(Value::Integer(i)) => ChecksumOutput::Integer(
                u64::try_from(i)
                    .map_err(|_| Error::Protocol("Negative checksum output".into()))?,
            ),
            Some(Value::Bytes(b)) => ChecksumOutput::Bytes(Bytes::from(b)),
            other => {
                return Err(Error::Protocol(format!(
                    "Unexpected checksum output: {:?}",
                    other
                )))
            }
        };
        Ok(Self {
            kind: body.require_text("type")?,
            off: body.take_u64("off")?.unwrap_or(0),
            len: body.require_u64("len")?,
            output,
            extra: body.into_extra(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_chunk_carries_length() {
        let chunk = FileUpload {
            name: "/lfs/doc.txt",
            off: 0,
            data: b"abc",
            len: Some(3),
        };
        let body = chunk.body();
        assert!(body.contains("len"));
        assert_eq!(body.get("data"), Some(&Value::Bytes(b"abc".to_vec())));

        let later = FileUpload { off: 3, len: None, ..chunk };
        assert!(!later.body().contains("len"));
    }

    #[test]
    fn download_response_requires_offset() {
        let body = Body::new().with("data", Value::Bytes(vec![1, 2]));
        assert!(FileDownloadResponse::from_body(body).is_err());

        let body = Body::new()
            .with("off", 0u64)
            .with("data", Value::Bytes(vec![1, 2]))
            .with("len", 10u64);
        let resp = FileDownloadResponse::from_body(body).unwrap();
        assert_eq!(resp.len, Some(10));
        assert_eq!(&resp.data[..], &[1, 2]);
    }

    #[test]
    fn checksum_output_may_be_integer() {
        let body = Body::new()
            .with("type", "crc32")
            .with("off", 0u64)
            .with("len", 4u64)
            .with("output", 0xDEADBEEFu64);
        let resp = FileChecksumResponse::from_body(body).unwrap();
        assert_eq!(resp.output, ChecksumOutput::Integer(0xDEADBEEF));
    }
}
