//! Chunked transfers over an [`SmpClient`].
//!
//! Uploads and downloads are exposed as streams of progress values so callers
//! can report throughput or stop early by dropping the stream.

use async_stream::try_stream;
use bytes::Bytes;
use log::{debug, info};
use tokio_stream::{Stream, StreamExt};

use crate::client::SmpClient;
use crate::error::{Error, Result};
use crate::protocols::mgmt::fs::{ChecksumOutput, FileChecksum, FileDownload};
use crate::protocols::smp::HEADER_SIZE;
use crate::protocols::FrameCodec;
use crate::transport::ByteChannel;

mod types;

pub use self::types::*;

/// Size of the CBOR head in front of a byte string of `len` bytes.
fn bstr_head_len(len: usize) -> usize {
    match len {
        0..=23 => 1,
        24..=0xFF => 2,
        0x100..=0xFFFF => 3,
        _ => 5,
    }
}

impl<C: ByteChannel, F: FrameCodec> SmpClient<C, F> {
    /// Largest data slice the next chunk to `target` can carry.
    fn chunk_budget<T: UploadTarget>(&self, target: &T, state: &TransferState) -> Result<usize> {
        let empty = target.chunk_request(state.offset(), state.total(), &[])?;
        let overhead = HEADER_SIZE + empty.payload.len() - bstr_head_len(0);

        let available = self.max_payload_size().saturating_sub(overhead);
        let mut size = available.saturating_sub(1);
        while size > 0 && size + bstr_head_len(size) > available {
            size -= 1;
        }
        if size == 0 {
            return Err(Error::Configuration(format!(
                "{} byte message budget leaves no room for upload data",
                self.max_payload_size()
            )));
        }

        Ok(self.config().chunk_size.map_or(size, |cap| cap.min(size)))
    }

    /// Uploads `data` to `target`, yielding the acknowledged offset after
    /// every chunk. Empty data yields nothing.
    pub fn upload<'a, T>(&'a mut self, target: T, data: &'a [u8]) -> impl Stream<Item = Result<u64>> + 'a
    where
        T: UploadTarget + std::fmt::Debug + 'a,
    {
        try_stream! {
            let mut state = TransferState::new(data.len() as u64);
            info!("Uploading {} bytes to {:?}", data.len(), target);

            while !state.is_complete() {
                let offset = state.offset();
                let chunk_size = self
                    .chunk_budget(&target, &state)
                    .map_err(|e| Error::transfer(offset, e))?;
                let chunk_end = state.chunk_end(chunk_size);

                let request = target
                    .chunk_request(offset, state.total(), &data[offset as usize..chunk_end as usize])
                    .map_err(|e| Error::transfer(offset, e))?;
                debug!("Sending chunk {}..{} of {}", offset, chunk_end, state.total());

                let response = self
                    .send_and_receive(request)
                    .await
                    .map_err(|e| Error::transfer(offset, e))?;
                let acknowledged = target
                    .acknowledged_offset(&response)
                    .map_err(|e| Error::transfer(offset, e))?;
                let next = state
                    .confirm(chunk_end, acknowledged, self.config().max_retries)
                    .map_err(|e| Error::transfer(offset, e))?;

                yield next;
            }

            info!("Upload to {:?} complete", target);
        }
    }

    pub fn upload_file<'a>(&'a mut self, name: &str, data: &'a [u8]) -> impl Stream<Item = Result<u64>> + 'a {
        self.upload(FileTarget::new(name), data)
    }

    pub fn upload_image<'a>(&'a mut self, target: ImageTarget, data: &'a [u8]) -> impl Stream<Item = Result<u64>> + 'a {
        self.upload(target, data)
    }

    /// Downloads `name`, yielding each received chunk with the offset reached
    /// after it. Ends when the device sends no more data or, if the first
    /// response gave a length, once that many bytes have arrived.
    pub fn download_file<'a>(&'a mut self, name: &'a str) -> impl Stream<Item = Result<(Bytes, u64)>> + 'a {
        try_stream! {
            let mut offset = 0u64;
            let mut total: Option<u64> = None;
            info!("Downloading {}", name);

            loop {
                let response = self
                    .request(&FileDownload { name, off: offset })
                    .await
                    .map_err(|e| Error::transfer(offset, e))?;

                if response.off != offset {
                    Err(Error::transfer(offset, Error::Protocol(format!(
                        "Device answered offset {} for a request at {}",
                        response.off, offset
                    ))))?;
                }

                if offset == 0 {
                    total = response.len;
                }

                if response.data.is_empty() {
                    break;
                }

                let next = offset + response.data.len() as u64;
                if let Some(total) = total.filter(|total| next > *total) {
                    Err(Error::transfer(offset, Error::Protocol(format!(
                        "Device sent {} bytes of a {} byte file",
                        next, total
                    ))))?;
                }
                offset = next;

                debug!("Received {} of {:?} bytes", offset, total);
                yield (response.data, offset);

                if total == Some(offset) {
                    break;
                }
            }

            info!("Download of {} complete", name);
        }
    }

    /// Downloads `name` into memory.
    pub async fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut contents = Vec::new();
        let stream = self.download_file(name);
        tokio::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let (data, _) = chunk?;
            contents.extend_from_slice(&data);
        }
        Ok(contents)
    }

    /// Compares the CRC32 of `data` with the device's checksum of `name`.
    pub async fn verify_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let expected = crc32fast::hash(data);
        let response = self.request(&FileChecksum::crc32(name)).await?;

        let actual = match response.output {
            ChecksumOutput::Integer(value) => u32::try_from(value).map_err(|_| {
                Error::Protocol(format!("CRC32 output {:#x} does not fit 32 bits", value))
            })?,
            ChecksumOutput::Bytes(_) => {
                return Err(Error::Protocol(format!(
                    "Expected an integer for checksum type '{}'",
                    response.kind
                )));
            }
        };

        if response.len != data.len() as u64 || actual != expected {
            return Err(Error::VerificationFailed { expected, actual });
        }

        info!("Verified {} ({} bytes, CRC: {:#010x})", name, data.len(), actual);
        Ok(())
    }
}
