//! Loading upload payloads from disk.
//!
//! Raw images are taken as they are. Intel HEX files are flattened into one
//! contiguous image starting at their lowest address, with gaps filled with
//! `0xFF` as erased flash would read.

use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};

const FILL_BYTE: u8 = 0xFF;

/// Largest flattened HEX image accepted.
pub const MAX_IMAGE_SIZE: u64 = 16 * 1024 * 1024;

pub async fn load_image(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let is_hex = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hex") || ext.eq_ignore_ascii_case("ihex"));

    let image = if is_hex {
        let text = tokio::fs::read_to_string(path).await?;
        parse_hex(&text)?
    } else {
        tokio::fs::read(path).await?
    };

    info!(
        "Loaded {} ({} bytes, CRC: {:#010x})",
        path.display(),
        image.len(),
        crc32fast::hash(&image)
    );
    Ok(image)
}

pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let mut base = 0u64;
    let mut segments = Vec::new();

    for record in ihex::Reader::new(text) {
        match record? {
            ihex::Record::Data { offset, value } => {
                segments.push((base + offset as u64, value));
            }
            ihex::Record::ExtendedLinearAddress(upper) => base = (upper as u64) << 16,
            ihex::Record::ExtendedSegmentAddress(segment) => base = (segment as u64) << 4,
            ihex::Record::EndOfFile => break,
            _ => {}
        }
    }

    let start = segments
        .iter()
        .map(|(address, _)| *address)
        .min()
        .ok_or_else(|| Error::Configuration("HEX file contains no data".into()))?;
    let end = segments
        .iter()
        .map(|(address, data)| address + data.len() as u64)
        .max()
        .unwrap_or(start);

    let span = end - start;
    if span > MAX_IMAGE_SIZE {
        return Err(Error::FirmwareTooLarge(span, MAX_IMAGE_SIZE));
    }

    debug!("HEX image spans {:#010x}..{:#010x}", start, end);
    let mut image = vec![FILL_BYTE; span as usize];
    for (address, data) in segments {
        let at = (address - start) as usize;
        image[at..at + data.len()].copy_from_slice(&data);
    }

    Ok(image)
}
