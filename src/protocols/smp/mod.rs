//! SMP message records: the 8-byte header plus a CBOR map body.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use ciborium::Value;

use crate::error::{Error, Result};

mod header;
mod types;

pub use self::header::{Header, HEADER_SIZE};
pub use self::types::{group, Operation, ProtocolVersion};

/// An outgoing request. `sequence` is assigned by the client unless the
/// caller pins it.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub sequence: Option<u8>,
    pub group: u16,
    pub command: u8,
    pub op: Operation,
    pub payload: Bytes,
}

impl Request {
    pub fn new(op: Operation, group: u16, command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence: None,
            group,
            command,
            op,
            payload: payload.into(),
        }
    }

    pub fn read(group: u16, command: u8, body: &Body) -> Result<Self> {
        Ok(Self::new(Operation::Read, group, command, body.encode()?))
    }

    pub fn write(group: u16, command: u8, body: &Body) -> Result<Self> {
        Ok(Self::new(Operation::Write, group, command, body.encode()?))
    }

    pub fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn header(&self, sequence: u8, version: ProtocolVersion) -> Result<Header> {
        let length = u16::try_from(self.payload.len()).map_err(|_| {
            Error::Protocol(format!("Request body of {} bytes is too large", self.payload.len()))
        })?;
        Ok(Header {
            op: self.op,
            version,
            flags: 0,
            length,
            group: self.group,
            sequence,
            command: self.command,
        })
    }

    pub fn to_bytes(&self, sequence: u8, version: ProtocolVersion) -> Result<Bytes> {
        let header = self.header(sequence, version)?;
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        header.encode(&mut buf);
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Parses a request frame, as a device would.
    pub fn from_bytes(frame: &[u8]) -> Result<(Header, Self)> {
        let (header, payload) = split_frame(frame)?;
        if header.op.is_response() {
            return Err(Error::Protocol(format!("Expected a request, got {:?}", header.op)));
        }
        let request = Self {
            sequence: Some(header.sequence),
            group: header.group,
            command: header.command,
            op: header.op,
            payload,
        };
        Ok((header, request))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub header: Header,
    pub payload: Bytes,
}

impl Response {
    pub fn from_bytes(frame: &[u8]) -> Result<Self> {
        let (header, payload) = split_frame(frame)?;
        if !header.op.is_response() {
            return Err(Error::Protocol(format!("Expected a response, got {:?}", header.op)));
        }
        Ok(Self { header, payload })
    }

    /// Builds the response to `request` carrying `body`, as a device would.
    pub fn for_request(header: &Header, body: &Body) -> Result<Self> {
        let payload = body.encode()?;
        let header = Header {
            op: header.op.response(),
            length: payload.len() as u16,
            ..*header
        };
        Ok(Self { header, payload })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.header.encode(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    pub fn sequence(&self) -> u8 {
        self.header.sequence
    }

    pub fn body(&self) -> Result<Body> {
        Body::decode(&self.payload)
    }

    /// Maps a device-reported failure (`rc` or `err`) to [`Error::Device`].
    pub fn status(&self) -> Result<()> {
        let body = self.body()?;

        if let Some(rc) = body.get_i64("rc")? {
            if rc != 0 {
                return Err(Error::Device {
                    group: self.header.group,
                    rc,
                    reason: body.get_text("rsn")?,
                });
            }
        }

        if let Some(Value::Map(err)) = body.get("err") {
            let mut err = Body::from_entries(err.clone());
            let rc = err.take_i64("rc")?.unwrap_or(0);
            if rc != 0 {
                let group = err.take_u64("group")?.unwrap_or(self.header.group as u64) as u16;
                return Err(Error::Device {
                    group,
                    rc,
                    reason: body.get_text("rsn")?,
                });
            }
        }

        Ok(())
    }
}

fn split_frame(frame: &[u8]) -> Result<(Header, Bytes)> {
    let header = Header::decode(frame)?;
    let body = &frame[HEADER_SIZE..];
    if body.len() != header.length as usize {
        return Err(Error::Protocol(format!(
            "Header announces {} body bytes, frame carries {}",
            header.length,
            body.len()
        )));
    }
    Ok((header, Bytes::copy_from_slice(body)))
}

/// A CBOR map body keyed by text.
///
/// Known fields are taken out by name; whatever is left over is the set of
/// fields this client does not model, returned by [`Body::into_extra`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    fields: BTreeMap<String, Value>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn from_entries(entries: Vec<(Value, Value)>) -> Self {
        let fields = entries
            .into_iter()
            .filter_map(|(k, v)| match k {
                Value::Text(key) => Some((key, v)),
                _ => None,
            })
            .collect();
        Self { fields }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        let value: Value = ciborium::from_reader(bytes).map_err(Error::cbor)?;
        match value {
            Value::Map(entries) => Ok(Self::from_entries(entries)),
            other => Err(Error::Protocol(format!("Expected a CBOR map body, got {:?}", other))),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let map = Value::Map(
            self.fields
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), v.clone()))
                .collect(),
        );
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).map_err(Error::cbor)?;
        Ok(Bytes::from(buf))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.get(key).map(|v| as_i64(key, v)).transpose()
    }

    pub fn get_text(&self, key: &str) -> Result<Option<String>> {
        self.get(key).map(|v| as_text(key, v.clone())).transpose()
    }

    pub fn take_u64(&mut self, key: &str) -> Result<Option<u64>> {
        self.remove(key).map(|v| as_u64(key, &v)).transpose()
    }

    pub fn take_i64(&mut self, key: &str) -> Result<Option<i64>> {
        self.remove(key).map(|v| as_i64(key, &v)).transpose()
    }

    pub fn take_bool(&mut self, key: &str) -> Result<Option<bool>> {
        self.remove(key)
            .map(|v| match v {
                Value::Bool(b) => Ok(b),
                other => Err(type_error(key, "bool", &other)),
            })
            .transpose()
    }

    pub fn take_text(&mut self, key: &str) -> Result<Option<String>> {
        self.remove(key).map(|v| as_text(key, v)).transpose()
    }

    pub fn take_bytes(&mut self, key: &str) -> Result<Option<Bytes>> {
        self.remove(key)
            .map(|v| match v {
                Value::Bytes(b) => Ok(Bytes::from(b)),
                other => Err(type_error(key, "bytes", &other)),
            })
            .transpose()
    }

    pub fn take_array(&mut self, key: &str) -> Result<Option<Vec<Value>>> {
        self.remove(key)
            .map(|v| match v {
                Value::Array(items) => Ok(items),
                other => Err(type_error(key, "array", &other)),
            })
            .transpose()
    }

    pub fn require_u64(&mut self, key: &str) -> Result<u64> {
        self.take_u64(key)?.ok_or_else(|| missing(key))
    }

    pub fn require_text(&mut self, key: &str) -> Result<String> {
        self.take_text(key)?.ok_or_else(|| missing(key))
    }

    pub fn into_extra(self) -> BTreeMap<String, Value> {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn as_u64(key: &str, value: &Value) -> Result<u64> {
    match value {
        Value::Integer(i) => u64::try_from(*i).map_err(|_| type_error(key, "unsigned integer", value)),
        other => Err(type_error(key, "unsigned integer", other)),
    }
}

fn as_i64(key: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Integer(i) => i64::try_from(*i).map_err(|_| type_error(key, "integer", value)),
        other => Err(type_error(key, "integer", other)),
    }
}

fn as_text(key: &str, value: Value) -> Result<String> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(type_error(key, "text", &other)),
    }
}

fn type_error(key: &str, expected: &str, got: &Value) -> Error {
    Error::Protocol(format!("Field '{}' should be {}, got {:?}", key, expected, got))
}

fn missing(key: &str) -> Error {
    Error::Protocol(format!("Missing required field '{}'", key))
}
