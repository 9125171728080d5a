use log::warn;

use crate::error::{Error, Result};
use crate::protocols::mgmt::fs::{FileUpload, FileUploadResponse};
use crate::protocols::mgmt::image::{ImageUpload, ImageUploadResponse};
use crate::protocols::mgmt::{Command, FromBody};
use crate::protocols::smp::{Request, Response};

/// Progress of one upload. Only ever moves forward, and never past `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    total: u64,
    offset: u64,
    stalled: usize,
}

impl TransferState {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            offset: 0,
            stalled: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_complete(&self) -> bool {
        self.offset >= self.total
    }

    /// End of the chunk starting at the current offset.
    pub fn chunk_end(&self, chunk_size: usize) -> u64 {
        self.offset.saturating_add(chunk_size as u64).min(self.total)
    }

    /// Applies the device's answer to the chunk ending at `chunk_end`.
    ///
    /// A reported offset that differs from `chunk_end` wins: the device knows
    /// what it has stored. Answers that do not move the offset forward are
    /// tolerated `max_retries` times in a row.
    pub fn confirm(&mut self, chunk_end: u64, reported: Option<u64>, max_retries: usize) -> Result<u64> {
        let next = match reported {
            Some(off) if off > self.total => {
                return Err(Error::Protocol(format!(
                    "Device reported offset {} beyond the {} byte image",
                    off, self.total
                )));
            }
            Some(off) if off != chunk_end => {
                warn!("Device expects offset {}, not {}; resuming from there", off, chunk_end);
                off
            }
            _ => chunk_end,
        };

        if next > self.offset {
            self.stalled = 0;
        } else {
            self.stalled += 1;
            if self.stalled > max_retries {
                return Err(Error::Protocol(format!(
                    "Device made no progress past offset {} after {} attempts",
                    self.offset, self.stalled
                )));
            }
        }

        self.offset = next;
        Ok(next)
    }
}

/// Where upload chunks go. Builds the per-chunk request and reads back the
/// offset the device acknowledged.
pub trait UploadTarget {
    fn chunk_request(&self, offset: u64, total: u64, data: &[u8]) -> Result<Request>;

    fn acknowledged_offset(&self, response: &Response) -> Result<Option<u64>>;
}

/// A file on the device file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    pub name: String,
}

impl FileTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl UploadTarget for FileTarget {
    fn chunk_request(&self, offset: u64, total: u64, data: &[u8]) -> Result<Request> {
        FileUpload {
            name: &self.name,
            off: offset,
            data,
            len: (offset == 0).then_some(total),
        }
        .to_request()
    }

    fn acknowledged_offset(&self, response: &Response) -> Result<Option<u64>> {
        Ok(FileUploadResponse::from_body(response.body()?)?.off)
    }
}

/// A firmware image slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageTarget {
    pub image: Option<u64>,
    pub upgrade: Option<bool>,
}

impl ImageTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: u64) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_upgrade(mut self, upgrade: bool) -> Self {
        self.upgrade = Some(upgrade);
        self
    }
}

impl UploadTarget for ImageTarget {
    fn chunk_request(&self, offset: u64, total: u64, data: &[u8]) -> Result<Request> {
        let first = offset == 0;
        ImageUpload {
            image: self.image.filter(|_| first),
            len: first.then_some(total),
            off: offset,
            data,
            upgrade: self.upgrade.filter(|_| first),
        }
        .to_request()
    }

    fn acknowledged_offset(&self, response: &Response) -> Result<Option<u64>> {
        let response = ImageUploadResponse::from_body(response.body()?)?;
        if response.matched == Some(false) {
            warn!("Device reports the uploaded image does not match");
        }
        Ok(response.off)
    }
}
