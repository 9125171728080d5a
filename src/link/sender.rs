use log::trace;

use crate::error::{Error, Result};
use crate::protocols::FrameCodec;
use crate::transport::ByteChannel;

/// Writes encoded frames one fragment at a time, waiting for the channel's
/// output buffer to drain after each fragment.
pub struct FlowControlledSender<F: FrameCodec> {
    codec: F,
    max_fragment_size: usize,
}

impl<F: FrameCodec> FlowControlledSender<F> {
    pub fn new(codec: F, max_fragment_size: usize) -> Self {
        Self {
            codec,
            max_fragment_size,
        }
    }

    pub fn max_fragment_size(&self) -> usize {
        self.max_fragment_size
    }

    pub async fn send_frame<C: ByteChannel>(&self, channel: &mut C, payload: &[u8]) -> Result<()> {
        let fragments = self.codec.encode(payload, self.max_fragment_size)?;
        for fragment in &fragments {
            write_all(channel, fragment).await?;
            drain(channel).await?;
        }
        trace!("Sent {} byte frame in {} fragments", payload.len(), fragments.len());
        Ok(())
    }
}

async fn write_all<C: ByteChannel>(channel: &mut C, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        let written = channel.write(data).await?;
        if written == 0 {
            return Err(Error::Channel(std::io::ErrorKind::WriteZero.into()));
        }
        data = &data[written..];
    }
    Ok(())
}

async fn drain<C: ByteChannel>(channel: &mut C) -> Result<()> {
    loop {
        let pending = channel.bytes_pending()?;
        if pending == 0 {
            return Ok(());
        }
        trace!("{} bytes pending in output buffer", pending);
        channel.drain_pause().await;
    }
}
