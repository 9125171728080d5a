use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{trace, warn};

use crate::error::{Error, Result};
use crate::protocols::{DecodeResult, FrameCodec, FrameDecoder};
use crate::transport::ByteChannel;

const INITIAL_CAPACITY: usize = 1024;

/// Turns the raw inbound byte stream into complete logical frames.
///
/// All state lives here rather than on the stack of `pull_next_frame`, so a
/// pull that is cancelled (for instance by a timeout) loses nothing: the next
/// pull continues the same frame.
pub struct Reassembler<F: FrameCodec> {
    codec: F,
    decoder: F::Decoder,
    buffer: BytesMut,
    read_size: usize,
    read_timeout: Duration,
}

impl<F: FrameCodec> Reassembler<F> {
    pub fn new(codec: F, read_size: usize, read_timeout: Duration) -> Self {
        let decoder = codec.decoder();
        Self {
            codec,
            decoder,
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            read_size,
            read_timeout,
        }
    }

    /// Bytes received but not yet consumed as fragments.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True while part of a frame has been decoded.
    pub fn in_frame(&self) -> bool {
        !self.decoder.is_idle()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.decoder = self.codec.decoder();
    }

    /// Returns the next complete frame, reading from `channel` as needed.
    pub async fn pull_next_frame<C: ByteChannel>(&mut self, channel: &mut C) -> Result<Bytes> {
        loop {
            if let Some(frame) = self.drain_buffer()? {
                return Ok(frame);
            }

            match channel.read_available(self.read_size, self.read_timeout).await? {
                Some(data) if data.is_empty() => continue,
                Some(data) => {
                    trace!("Read {} bytes", data.len());
                    self.buffer.extend_from_slice(&data);
                }
                None => {
                    if self.in_frame() || !self.buffer.is_empty() {
                        self.reset();
                        return Err(Error::Protocol(
                            "channel closed in the middle of a frame".into(),
                        ));
                    }
                    return Err(Error::ChannelClosed);
                }
            }
        }
    }

    /// Feeds every buffered fragment to the decoder until a frame completes.
    fn drain_buffer(&mut self) -> Result<Option<Bytes>> {
        while let Some(fragment) = self.codec.split_fragment(&mut self.buffer)? {
            match self.decoder.feed(&fragment) {
                Ok(DecodeResult::NeedMore) => {}
                Ok(DecodeResult::Complete(frame)) => {
                    trace!("Reassembled {} byte frame", frame.len());
                    self.decoder = self.codec.decoder();
                    return Ok(Some(frame));
                }
                Err(e) if self.decoder.is_idle() => {
                    warn!("Ignoring {} bytes outside a frame: {}", fragment.len(), e);
                }
                Err(e) => {
                    self.decoder = self.codec.decoder();
                    return Err(e);
                }
            }
        }
        Ok(None)
    }
}
