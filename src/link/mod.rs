//! Reliability layer between the byte channel and the request/response
//! client: inbound frame reassembly and outbound flow control.

mod reassembler;
mod sender;

pub use self::reassembler::Reassembler;
pub use self::sender::FlowControlledSender;
