#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use ciborium::Value;
use smpclient::protocols::serial::{SerialCodec, SerialDecoder};
use smpclient::protocols::smp::{group, Body, Header, Operation, Request, Response};
use smpclient::protocols::{DecodeResult, FrameCodec, FrameDecoder};
use smpclient::{ByteChannel, ClientConfig, Error, Result, SmpClient};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config() -> ClientConfig {
    ClientConfig::new()
        .with_timeout(Duration::from_millis(500))
        .with_read_timeout(Duration::from_millis(1))
}

pub async fn connect<D: Device>(device: D, config: ClientConfig) -> SmpClient<SimulatedDevice<D>> {
    init_logging();
    let mut client = SmpClient::new(SimulatedDevice::new(device), config).unwrap();
    client.connect().await.unwrap();
    client
}

pub enum Reply {
    Respond(Body),
    /// Answers with a sequence number of the device's choosing.
    RespondAs(u8, Body),
    Ignore,
}

pub trait Device {
    fn handle(&mut self, header: &Header, body: Body) -> Reply;
}

impl<F> Device for F
where
    F: FnMut(&Header, Body) -> Reply,
{
    fn handle(&mut self, header: &Header, body: Body) -> Reply {
        self(header, body)
    }
}

/// Device side of a serial link: reassembles what the client writes and
/// queues encoded responses for it to read.
pub struct SimulatedDevice<D> {
    open: bool,
    codec: SerialCodec,
    decoder: SerialDecoder,
    inbound: BytesMut,
    outbound: BytesMut,
    line_length: usize,
    pub device: D,
    pub headers: Vec<Header>,
    pub frame_sizes: Vec<usize>,
}

impl<D: Device> SimulatedDevice<D> {
    pub fn new(device: D) -> Self {
        let codec = SerialCodec::new();
        Self {
            open: false,
            decoder: codec.decoder(),
            codec,
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            line_length: 128,
            device,
            headers: Vec::new(),
            frame_sizes: Vec::new(),
        }
    }

    fn process_inbound(&mut self) -> Result<()> {
        while let Some(line) = self.codec.split_fragment(&mut self.inbound)? {
            if let DecodeResult::Complete(frame) = self.decoder.feed(&line)? {
                self.decoder = self.codec.decoder();
                self.answer(&frame)?;
            }
        }
        Ok(())
    }

    fn answer(&mut self, frame: &[u8]) -> Result<()> {
        let (header, request) = Request::from_bytes(frame)?;
        self.headers.push(header);
        self.frame_sizes.push(frame.len());

        let body = Body::decode(&request.payload)?;
        let (header, body) = match self.device.handle(&header, body) {
            Reply::Respond(body) => (header, body),
            Reply::RespondAs(sequence, body) => (Header { sequence, ..header }, body),
            Reply::Ignore => return Ok(()),
        };

        let response = Response::for_request(&header, &body)?;
        for fragment in self.codec.encode(&response.to_bytes(), self.line_length)? {
            self.outbound.extend_from_slice(&fragment);
        }
        Ok(())
    }
}

impl<D: Device> ByteChannel for SimulatedDevice<D> {
    async fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(Error::NotConnected);
        }
        self.inbound.extend_from_slice(data);
        self.process_inbound()?;
        Ok(data.len())
    }

    fn bytes_pending(&mut self) -> Result<usize> {
        Ok(0)
    }

    async fn read_available(&mut self, max_bytes: usize, timeout: Duration) -> Result<Option<Bytes>> {
        if self.outbound.is_empty() {
            tokio::time::sleep(timeout).await;
            return Ok(Some(Bytes::new()));
        }
        let n = max_bytes.min(self.outbound.len());
        Ok(Some(self.outbound.split_to(n).freeze()))
    }

    async fn drain_pause(&mut self) {
        tokio::task::yield_now().await;
    }
}

pub fn rc(code: i64) -> Body {
    Body::new().with("rc", code)
}

/// File system and image management, enough for transfer tests.
#[derive(Debug, Default)]
pub struct FileSystem {
    pub files: HashMap<String, Vec<u8>>,
    pub image: Vec<u8>,
    pub image_len: Option<u64>,
    pub download_chunk: usize,
    pub upload_offsets: Vec<u64>,
}

const ENOENT: i64 = 2;
const EINVAL: i64 = 3;
const ENOTSUP: i64 = 8;

impl FileSystem {
    pub fn new() -> Self {
        Self {
            download_chunk: 256,
            ..Self::default()
        }
    }

    pub fn with_file(mut self, name: &str, data: Vec<u8>) -> Self {
        self.files.insert(name.to_string(), data);
        self
    }

    fn upload(&mut self, mut body: Body) -> Body {
        let (Ok(name), Ok(off)) = (body.require_text("name"), body.require_u64("off")) else {
            return rc(EINVAL);
        };
        let data = body.take_bytes("data").ok().flatten().unwrap_or_default();
        self.upload_offsets.push(off);

        let file = self.files.entry(name).or_default();
        if off == 0 {
            file.clear();
        }
        if off as usize == file.len() {
            file.extend_from_slice(&data);
        }
        Body::new().with("off", file.len() as u64)
    }

    fn download(&mut self, mut body: Body) -> Body {
        let (Ok(name), Ok(off)) = (body.require_text("name"), body.require_u64("off")) else {
            return rc(EINVAL);
        };
        let Some(file) = self.files.get(&name) else {
            return rc(ENOENT);
        };

        let start = (off as usize).min(file.len());
        let end = (start + self.download_chunk).min(file.len());
        let mut response = Body::new()
            .with("off", off)
            .with("data", Value::Bytes(file[start..end].to_vec()));
        if off == 0 {
            response.insert("len", file.len() as u64);
        }
        response
    }

    fn checksum(&mut self, mut body: Body) -> Body {
        let Ok(name) = body.require_text("name") else {
            return rc(EINVAL);
        };
        let Some(file) = self.files.get(&name) else {
            return rc(ENOENT);
        };
        Body::new()
            .with("type", "crc32")
            .with("off", 0u64)
            .with("len", file.len() as u64)
            .with("output", crc32fast::hash(file) as u64)
    }

    fn image_upload(&mut self, mut body: Body) -> Body {
        let Ok(off) = body.require_u64("off") else {
            return rc(EINVAL);
        };
        if off == 0 {
            self.image.clear();
            self.image_len = body.take_u64("len").ok().flatten();
        }
        let data = body.take_bytes("data").ok().flatten().unwrap_or_default();
        self.upload_offsets.push(off);
        if off as usize == self.image.len() {
            self.image.extend_from_slice(&data);
        }
        Body::new().with("off", self.image.len() as u64)
    }
}

impl Device for FileSystem {
    fn handle(&mut self, header: &Header, body: Body) -> Reply {
        let reply = match (header.group, header.command, header.op) {
            (group::FS, 0, Operation::Write) => self.upload(body),
            (group::FS, 0, Operation::Read) => self.download(body),
            (group::FS, 2, Operation::Read) => self.checksum(body),
            (group::IMAGE, 1, Operation::Write) => self.image_upload(body),
            _ => rc(ENOTSUP),
        };
        Reply::Respond(reply)
    }
}
