//! Typed management commands on top of [`smp`](crate::protocols::smp) bodies.

use crate::error::Result;
use crate::protocols::smp::{Body, Operation, Request};

pub mod fs;
pub mod image;
pub mod mgmt_ex;
pub mod os;

pub use self::image::ImageState;

pub trait Command {
    const GROUP: u16;
    const ID: u8;
    const OP: Operation;

    type Response: FromBody;

    fn body(&self) -> Body;

    fn to_request(&self) -> Result<Request> {
        Ok(Request::new(Self::OP, Self::GROUP, Self::ID, self.body().encode()?))
    }
}

/// Parses a decoded response body into a typed record.
pub trait FromBody: Sized {
    fn from_body(body: Body) -> Result<Self>;
}

/// For commands whose response carries nothing of interest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Empty {
    pub extra: std::collections::BTreeMap<String, ciborium::Value>,
}

impl FromBody for Empty {
    fn from_body(body: Body) -> Result<Self> {
        Ok(Self {
            extra: body.into_extra(),
        })
    }
}
