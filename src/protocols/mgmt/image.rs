//! Image management group.

use std::collections::BTreeMap;

use bytes::Bytes;
use ciborium::Value;

use super::{Command, FromBody};
use crate::error::{Error, Result};
use crate::protocols::smp::{group, Body, Operation};

const CMD_STATE: u8 = 0;
const CMD_UPLOAD: u8 = 1;

/// State of the image in one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageState {
    /// 0 is the running slot, 1 the secondary slot.
    pub slot: u64,
    pub version: String,
    pub image: Option<u64>,
    pub hash: Option<Bytes>,
    pub bootable: Option<bool>,
    pub pending: Option<bool>,
    pub confirmed: Option<bool>,
    pub active: Option<bool>,
    pub permanent: Option<bool>,
    pub crc: Option<u64>,
    pub chip: Option<u64>,
    pub extra: BTreeMap<String, Value>,
}

impl ImageState {
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Map(entries) = value else {
            return Err(Error::Protocol(format!("Image state should be a map, got {:?}", value)));
        };
        let mut body = Body::from_entries(entries);
        Ok(Self {
            slot: body.require_u64("slot")?,
            version: body.require_text("version")?,
            image: body.take_u64("image")?,
            hash: body.take_bytes("hash")?,
            bootable: body.take_bool("bootable")?,
            pending: body.take_bool("pending")?,
            confirmed: body.take_bool("confirmed")?,
            active: body.take_bool("active")?,
            permanent: body.take_bool("permanent")?,
            crc: body.take_u64("crc")?,
            chip: body.take_u64("chip")?,
            extra: body.into_extra(),
        })
    }
}

pub(crate) fn take_images(body: &mut Body) -> Result<Vec<ImageState>> {
    body.take_array("images")?
        .unwrap_or_default()
        .into_iter()
        .map(ImageState::from_value)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageStates;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageStatesResponse {
    pub images: Vec<ImageState>,
    pub split_status: Option<u64>,
    pub extra: BTreeMap<String, Value>,
}

impl Command for ImageStates {
    const GROUP: u16 = group::IMAGE;
    const ID: u8 = CMD_STATE;
    const OP: Operation = Operation::Read;

    type Response = ImageStatesResponse;

    fn body(&self) -> Body {
        Body::new()
    }
}

impl FromBody for ImageStatesResponse {
    fn from_body(mut body: Body) -> Result<Self> {
        Ok(Self {
            images: take_images(&mut body)?,
            split_status: body.take_u64("splitStatus")?,
            extra: body.into_extra(),
        })
    }
}

/// One chunk of an image upload. `image`, `len` and `upgrade` go with the
/// first chunk only.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload<'a> {
    pub image: Option<u64>,
    pub len: Option<u64>,
    pub off: u64,
    pub data: &'a [u8],
    pub upgrade: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageUploadResponse {
    pub off: Option<u64>,
    /// Whether the uploaded image matched the expected hash, sent at the end.
    pub matched: Option<bool>,
    pub extra: BTreeMap<String, Value>,
}

impl Command for ImageUpload<'_> {
    const GROUP: u16 = group::IMAGE;
    const ID: u8 = CMD_UPLOAD;
    const OP: Operation = Operation::Write;

    type Response = ImageUploadResponse;

    fn body(&self) -> Body {
        let mut body = Body::new()
            .with("off", self.off)
            .with("data", Value::Bytes(self.data.to_vec()));
        if let Some(image) = self.image {
            body.insert("image", image);
        }
        if let Some(len) = self.len {
            body.insert("len", len);
        }
        if let Some(upgrade) = self.upgrade {
            body.insert("upgrade", upgrade);
        }
        body
    }
}

impl FromBody for ImageUploadResponse {
    fn from_body(mut body: Body) -> Result<Self> {
        Ok(Self {
            off: body.take_u64("off")?,
            matched: body.take_bool("match")?,
            extra: body.into_extra(),
        })
    }
}
