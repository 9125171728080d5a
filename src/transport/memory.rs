use std::collections::VecDeque;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::sleep;

use super::ByteChannel;
use crate::error::{Error, Result};

/// In-memory channel with scripted input and recorded output.
///
/// Each queued read is returned by one `read_available` call (split if it is
/// larger than the requested maximum). Once the queue is empty reads time
/// out, or report end of stream after [`MemoryChannel::close_input`].
#[derive(Debug, Default)]
pub struct MemoryChannel {
    open: bool,
    incoming: VecDeque<Bytes>,
    input_closed: bool,
    written: BytesMut,
    write_limit: Option<usize>,
    pending: VecDeque<usize>,
    pending_polls: usize,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_read(&mut self, data: impl Into<Bytes>) {
        self.incoming.push_back(data.into());
    }

    pub fn push_reads<I, B>(&mut self, reads: I)
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.incoming.extend(reads.into_iter().map(Into::into));
    }

    /// Values reported by successive `bytes_pending` calls; 0 once exhausted.
    pub fn script_pending(&mut self, counts: impl IntoIterator<Item = usize>) {
        self.pending.extend(counts);
    }

    /// Caps how many bytes a single `write` accepts.
    pub fn limit_writes(&mut self, limit: usize) {
        self.write_limit = Some(limit);
    }

    pub fn close_input(&mut self) {
        self.input_closed = true;
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn take_written(&mut self) -> Bytes {
        self.written.split().freeze()
    }

    pub fn pending_polls(&self) -> usize {
        self.pending_polls
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

impl ByteChannel for MemoryChannel {
    async fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        let n = self.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        self.written.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn bytes_pending(&mut self) -> Result<usize> {
        self.ensure_open()?;
        self.pending_polls += 1;
        Ok(self.pending.pop_front().unwrap_or(0))
    }

    async fn read_available(&mut self, max_bytes: usize, timeout: Duration) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        match self.incoming.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > max_bytes {
                    let rest = chunk.split_off(max_bytes);
                    self.incoming.push_front(rest);
                }
                Ok(Some(chunk))
            }
            None if self.input_closed => Ok(None),
            None => {
                sleep(timeout).await;
                Ok(Some(Bytes::new()))
            }
        }
    }

    async fn drain_pause(&mut self) {
        tokio::task::yield_now().await;
    }
}
