//! Byte channels the client runs on.

use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

pub mod memory;
pub mod serial;

pub use self::memory::MemoryChannel;
pub use self::serial::SerialChannel;

pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(1);

/// A duplex byte stream to one device.
pub trait ByteChannel {
    async fn open(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Returns how many bytes the channel accepted.
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Bytes still queued in the output buffer.
    fn bytes_pending(&mut self) -> Result<usize>;

    /// Waits up to `timeout` for incoming bytes. An empty buffer means the
    /// wait timed out; `None` means the channel reached end of stream.
    async fn read_available(&mut self, max_bytes: usize, timeout: Duration) -> Result<Option<Bytes>>;

    /// Suspends between two output-buffer polls.
    async fn drain_pause(&mut self) {
        tokio::time::sleep(DEFAULT_DRAIN_INTERVAL).await;
    }
}
