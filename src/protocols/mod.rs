pub mod mgmt;
pub mod serial;
pub mod smp;

use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// Outcome of feeding one wire fragment to a [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    NeedMore,
    Complete(Bytes),
}

/// Accumulates the fragments of exactly one logical frame.
pub trait FrameDecoder {
    fn feed(&mut self, fragment: &[u8]) -> Result<DecodeResult>;

    /// True until the first fragment of a frame has been accepted.
    fn is_idle(&self) -> bool;
}

/// Link-level framing: splits a payload into wire fragments, finds fragment
/// boundaries in a raw byte stream and hands out per-frame decoders.
pub trait FrameCodec: Clone {
    type Decoder: FrameDecoder;

    fn encode(&self, payload: &[u8], max_fragment_size: usize) -> Result<Vec<Bytes>>;

    /// Slices the next complete fragment off the front of `buffer`, leaving
    /// any following bytes in place.
    fn split_fragment(&mut self, buffer: &mut BytesMut) -> Result<Option<BytesMut>>;

    fn decoder(&self) -> Self::Decoder;

    /// Largest payload whose encoding fits in `mtu` bytes of wire traffic.
    fn max_payload_size(&self, mtu: usize, max_fragment_size: usize) -> usize;
}
