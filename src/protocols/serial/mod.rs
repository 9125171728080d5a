//! SMP serial line encoding.
//!
//! A frame is `length || payload || crc16`, base64 encoded and cut into
//! newline-terminated lines. The first line starts with [`START_DELIMITER`],
//! the rest with [`CONTINUE_DELIMITER`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_XMODEM};
use log::{trace, warn};
use tokio_util::codec::Decoder;

use crate::error::{Error, Result};
use crate::protocols::{DecodeResult, FrameCodec, FrameDecoder};

mod types;

pub use self::types::*;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

#[derive(Debug, Clone, Default)]
pub struct SerialCodec {
    // Offset up to which the buffer has been searched for a newline.
    next_index: usize,
}

impl SerialCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for SerialCodec {
    type Item = BytesMut;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        loop {
            let start = self.next_index.min(src.len());
            let found = src[start..]
                .iter()
                .position(|b| *b == END_CHAR)
                .map(|i| i + start);

            let Some(end) = found else {
                if src.len() > MAX_LINE_LENGTH {
                    warn!("Discarding {} bytes without line terminator", src.len());
                    src.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            self.next_index = 0;
            let mut line = src.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line));
        }
    }
}

impl FrameCodec for SerialCodec {
    type Decoder = SerialDecoder;

    fn encode(&self, payload: &[u8], max_fragment_size: usize) -> Result<Vec<Bytes>> {
        if max_fragment_size <= FRAGMENT_OVERHEAD {
            return Err(Error::Configuration(format!(
                "fragment size {} leaves no room for data",
                max_fragment_size
            )));
        }

        let frame_len = u16::try_from(payload.len() + CRC_SIZE).map_err(|_| {
            Error::Protocol(format!("payload of {} bytes is too large to frame", payload.len()))
        })?;

        let mut raw = BytesMut::with_capacity(LENGTH_SIZE + frame_len as usize);
        raw.put_u16(frame_len);
        raw.extend_from_slice(payload);
        raw.put_u16(CRC16.checksum(payload));

        let text = STANDARD.encode(&raw);
        let per_line = max_fragment_size - FRAGMENT_OVERHEAD;

        let fragments: Vec<Bytes> = text
            .as_bytes()
            .chunks(per_line)
            .enumerate()
            .map(|(i, chunk)| {
                let mut line = BytesMut::with_capacity(chunk.len() + FRAGMENT_OVERHEAD);
                if i == 0 {
                    line.extend_from_slice(&START_DELIMITER);
                } else {
                    line.extend_from_slice(&CONTINUE_DELIMITER);
                }
                line.extend_from_slice(chunk);
                line.put_u8(END_CHAR);
                line.freeze()
            })
            .collect();

        trace!("Encoded {} byte payload into {} fragments", payload.len(), fragments.len());
        Ok(fragments)
    }

    fn split_fragment(&mut self, buffer: &mut BytesMut) -> Result<Option<BytesMut>> {
        self.decode(buffer)
    }

    fn decoder(&self) -> SerialDecoder {
        SerialDecoder::new()
    }

    fn max_payload_size(&self, mtu: usize, max_fragment_size: usize) -> usize {
        if max_fragment_size <= FRAGMENT_OVERHEAD {
            return 0;
        }
        let lines = mtu / max_fragment_size;
        let chars = lines * (max_fragment_size - FRAGMENT_OVERHEAD) / 4 * 4;
        (chars / 4 * 3).saturating_sub(LENGTH_SIZE + CRC_SIZE)
    }
}

/// Collects the base64 text of one frame across its lines.
#[derive(Debug, Default)]
pub struct SerialDecoder {
    text: Vec<u8>,
    complete: bool,
}

impl SerialDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for SerialDecoder {
    fn feed(&mut self, fragment: &[u8]) -> Result<DecodeResult> {
        if self.complete {
            return Err(Error::Protocol("decoder already produced its frame".into()));
        }
        if fragment.len() < DELIMITER_SIZE {
            return Err(Error::Protocol(format!("fragment too short: {:02x?}", fragment)));
        }

        let (delimiter, body) = fragment.split_at(DELIMITER_SIZE);
        let expected = if self.text.is_empty() {
            START_DELIMITER
        } else {
            CONTINUE_DELIMITER
        };
        if delimiter != expected {
            return Err(Error::Protocol(format!(
                "expected delimiter {:02x?}, got {:02x?}",
                expected, delimiter
            )));
        }

        self.text.extend_from_slice(body);
        if self.text.len() % 4 != 0 {
            return Ok(DecodeResult::NeedMore);
        }

        let raw = STANDARD
            .decode(&self.text)
            .map_err(|e| Error::Protocol(format!("invalid base64 in frame: {}", e)))?;
        if raw.len() < LENGTH_SIZE {
            return Ok(DecodeResult::NeedMore);
        }

        let frame_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
        let received = raw.len() - LENGTH_SIZE;
        if received < frame_len {
            return Ok(DecodeResult::NeedMore);
        }
        if received > frame_len || frame_len < CRC_SIZE {
            return Err(Error::Protocol(format!(
                "frame length {} does not match {} received bytes",
                frame_len, received
            )));
        }

        let (payload, crc) = raw[LENGTH_SIZE..].split_at(frame_len - CRC_SIZE);
        if CRC16.checksum(payload) != u16::from_be_bytes([crc[0], crc[1]]) {
            return Err(Error::CrcMismatch);
        }

        self.complete = true;
        Ok(DecodeResult::Complete(Bytes::copy_from_slice(payload)))
    }

    fn is_idle(&self) -> bool {
        self.text.is_empty()
    }
}
