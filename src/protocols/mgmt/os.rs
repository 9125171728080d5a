use std::collections::BTreeMap;

use ciborium::Value;

use super::{Command, Empty, FromBody};
use crate::error::Result;
use crate::protocols::smp::{group, Body, Operation};

const CMD_ECHO: u8 = 0;
const CMD_RESET: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Echo {
    pub d: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EchoResponse {
    pub r: String,
    pub extra: BTreeMap<String, Value>,
}

impl Command for Echo {
    const GROUP: u16 = group::OS;
    const ID: u8 = CMD_ECHO;
    const OP: Operation = Operation::Write;

    type Response = EchoResponse;

    fn body(&self) -> Body {
        Body::new().with("d", self.d.as_str())
    }
}

impl FromBody for EchoResponse {
    fn from_body(mut body: Body) -> Result<Self> {
        Ok(Self {
            r: body.require_text("r")?,
            extra: body.into_extra(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reset {
    pub force: bool,
}

impl Command for Reset {
    const GROUP: u16 = group::OS;
    const ID: u8 = CMD_RESET;
    const OP: Operation = Operation::Write;

    type Response = Empty;

    fn body(&self) -> Body {
        let body = Body::new();
        if self.force {
            body.with("force", 1)
        } else {
            body
        }
    }
}
