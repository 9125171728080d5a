//! Extended management group: image states with chip details and the
//! wireless charger transmitter firmware update trigger.

use std::collections::BTreeMap;

use ciborium::Value;

use super::image::{take_images, ImageState};
use super::{Command, FromBody};
use crate::error::Result;
use crate::protocols::smp::{group, Body, Operation};

const CMD_STATE: u8 = 0;
const CMD_WLC_TX_UPDATE: u8 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MgmtExStates;

#[derive(Debug, Clone, PartialEq)]
pub struct MgmtExStatesResponse {
    pub images: Vec<ImageState>,
    pub split_status: Option<u64>,
    pub extra: BTreeMap<String, Value>,
}

impl Command for MgmtExStates {
    const GROUP: u16 = group::MGMT_EX;
    const ID: u8 = CMD_STATE;
    const OP: Operation = Operation::Read;

    type Response = MgmtExStatesResponse;

    fn body(&self) -> Body {
        Body::new()
    }
}

impl FromBody for MgmtExStatesResponse {
    fn from_body(mut body: Body) -> Result<Self> {
        Ok(Self {
            images: take_images(&mut body)?,
            split_status: body.take_u64("splitStatus")?,
            extra: body.into_extra(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MgmtExUpdateWlcTxIc;

#[derive(Debug, Clone, PartialEq)]
pub struct MgmtExUpdateWlcTxIcResponse {
    pub split_status: Option<u64>,
    pub extra: BTreeMap<String, Value>,
}

impl Command for MgmtExUpdateWlcTxIc {
    const GROUP: u16 = group::MGMT_EX;
    const ID: u8 = CMD_WLC_TX_UPDATE;
    const OP: Operation = Operation::Write;

    type Response = MgmtExUpdateWlcTxIcResponse;

    fn body(&self) -> Body {
        Body::new()
    }
}

impl FromBody for MgmtExUpdateWlcTxIcResponse {
    fn from_body(mut body: Body) -> Result<Self> {
        Ok(Self {
            split_status: body.take_u64("splitStatus")?,
            extra: body.into_extra(),
        })
    }
}
