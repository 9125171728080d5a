use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::timeout;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::link::{FlowControlledSender, Reassembler};
use crate::protocols::mgmt::{os, Command, FromBody};
use crate::protocols::serial::SerialCodec;
use crate::protocols::smp::{Header, Operation, Request, Response, HEADER_SIZE};
use crate::protocols::FrameCodec;
use crate::transport::ByteChannel;

/// Timed-out requests whose late responses are still recognised.
const STALE_LIMIT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Disconnected,
    Ready,
    /// A frame is being written. Seeing this on entry means the previous
    /// send was cancelled part way through.
    Sending,
    Faulted,
}

/// What the response to an outstanding request must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Expected {
    sequence: u8,
    op: Operation,
    group: u16,
    command: u8,
}

impl Expected {
    fn check(&self, header: &Header) -> Result<()> {
        if header.op != self.op || header.group != self.group || header.command != self.command {
            return Err(Error::Protocol(format!(
                "Response {:?} group {} command {} does not answer {:?} group {} command {}",
                header.op, header.group, header.command, self.op, self.group, self.command
            )));
        }
        Ok(())
    }
}

/// One connection to one device: a byte channel, its reassembler and sender,
/// and the sequence counter. Requests run strictly one at a time.
pub struct SmpClient<C: ByteChannel, F: FrameCodec = SerialCodec> {
    channel: C,
    config: ClientConfig,
    reassembler: Reassembler<F>,
    sender: FlowControlledSender<F>,
    max_payload_size: usize,
    sequence: u8,
    state: LinkState,
    outstanding: Option<Expected>,
    stale: VecDeque<u8>,
}

impl<C: ByteChannel> SmpClient<C, SerialCodec> {
    pub fn new(channel: C, config: ClientConfig) -> Result<Self> {
        Self::with_codec(channel, SerialCodec::new(), config)
    }
}

impl<C: ByteChannel, F: FrameCodec> SmpClient<C, F> {
    pub fn with_codec(channel: C, codec: F, config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let max_payload_size = codec.max_payload_size(config.mtu, config.line_length);
        if max_payload_size <= HEADER_SIZE {
            return Err(Error::Configuration(format!(
                "MTU {} with line length {} leaves no room for a message",
                config.mtu, config.line_length
            )));
        }

        Ok(Self {
            channel,
            reassembler: Reassembler::new(codec.clone(), config.read_size, config.read_timeout),
            sender: FlowControlledSender::new(codec, config.line_length),
            config,
            max_payload_size,
            sequence: 0,
            state: LinkState::Disconnected,
            outstanding: None,
            stale: VecDeque::new(),
        })
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.channel.open().await?;
        self.reset_link();
        self.state = LinkState::Ready;
        info!(
            "Connected: mtu {}, line length {}, {} byte message budget",
            self.config.mtu, self.config.line_length, self.max_payload_size
        );
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.state = LinkState::Disconnected;
        self.reset_link();
        self.channel.close().await?;
        info!("Disconnected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Ready
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn mtu(&self) -> usize {
        self.config.mtu
    }

    /// Largest encoded message (header included) one frame can carry.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    fn reset_link(&mut self) {
        self.reassembler.reset();
        self.sequence = 0;
        self.outstanding = None;
        self.stale.clear();
    }

    fn next_sequence(&mut self) -> u8 {
        let sequence = self.sequence;
        self.sequence = sequence.wrapping_add(1);
        sequence
    }

    fn ensure_ready(&mut self) -> Result<()> {
        match self.state {
            LinkState::Ready => Ok(()),
            LinkState::Disconnected => Err(Error::NotConnected),
            LinkState::Sending => {
                warn!("Previous frame was only partially sent");
                self.state = LinkState::Faulted;
                Err(Error::ConnectionFaulted)
            }
            LinkState::Faulted => Err(Error::ConnectionFaulted),
        }
    }

    pub async fn send_and_receive(&mut self, request: Request) -> Result<Response> {
        let wait = self.config.timeout;
        self.send_and_receive_with_timeout(request, wait).await
    }

    pub async fn send_and_receive_with_timeout(
        &mut self,
        request: Request,
        wait: Duration,
    ) -> Result<Response> {
        self.ensure_ready()?;

        let sequence = match request.sequence {
            Some(sequence) => {
                self.sequence = sequence.wrapping_add(1);
                sequence
            }
            None => self.next_sequence(),
        };

        let frame = request.to_bytes(sequence, self.config.version)?;
        if frame.len() > self.max_payload_size {
            return Err(Error::Configuration(format!(
                "Request of {} bytes exceeds the {} byte message budget",
                frame.len(),
                self.max_payload_size
            )));
        }

        if let Some(previous) = self.outstanding.take() {
            if self.stale.len() == STALE_LIMIT {
                self.stale.pop_front();
            }
            self.stale.push_back(previous.sequence);
        }
        self.stale.retain(|s| *s != sequence);

        debug!(
            "Sending {:?} group {} command {} seq {} ({} bytes)",
            request.op,
            request.group,
            request.command,
            sequence,
            frame.len()
        );

        self.state = LinkState::Sending;
        if let Err(e) = self.sender.send_frame(&mut self.channel, &frame).await {
            self.state = LinkState::Faulted;
            return Err(e);
        }
        self.state = LinkState::Ready;

        let expected = Expected {
            sequence,
            op: request.op.response(),
            group: request.group,
            command: request.command,
        };
        self.outstanding = Some(expected);
        self.await_response(expected, wait).await
    }

    /// Keeps waiting for the response to a request that timed out, without
    /// sending anything.
    pub async fn resume(&mut self, wait: Duration) -> Result<Response> {
        self.ensure_ready()?;
        let expected = self
            .outstanding
            .ok_or_else(|| Error::Protocol("No request is awaiting a response".into()))?;
        self.await_response(expected, wait).await
    }

    /// Runs one typed command and parses its response.
    pub async fn request<R: Command>(&mut self, command: &R) -> Result<R::Response> {
        let response = self.send_and_receive(command.to_request()?).await?;
        R::Response::from_body(response.body()?)
    }

    pub async fn echo(&mut self, text: &str) -> Result<String> {
        let response = self.request(&os::Echo { d: text.to_string() }).await?;
        Ok(response.r)
    }

    async fn await_response(&mut self, expected: Expected, wait: Duration) -> Result<Response> {
        match timeout(wait, self.receive_matching(expected)).await {
            Err(_) => {
                warn!(
                    "No response to seq {} within {:?} ({} bytes buffered)",
                    expected.sequence,
                    wait,
                    self.reassembler.buffered()
                );
                Err(Error::Timeout)
            }
            Ok(Err(e)) => {
                if e.is_fatal() {
                    self.state = LinkState::Faulted;
                }
                Err(e)
            }
            Ok(Ok(response)) => {
                self.outstanding = None;
                debug!(
                    "Received response seq {} ({} bytes)",
                    response.sequence(),
                    response.payload.len()
                );
                response.status()?;
                Ok(response)
            }
        }
    }

    async fn receive_matching(&mut self, expected: Expected) -> Result<Response> {
        loop {
            let frame = self.reassembler.pull_next_frame(&mut self.channel).await?;
            let response = Response::from_bytes(&frame)?;
            let actual = response.sequence();

            if actual == expected.sequence {
                expected.check(&response.header)?;
                return Ok(response);
            }

            if let Some(position) = self.stale.iter().position(|s| *s == actual) {
                warn!("Discarding late response to timed out request seq {}", actual);
                self.stale.remove(position);
                continue;
            }

            return Err(Error::SequenceMismatch {
                expected: expected.sequence,
                actual,
            });
        }
    }
}
