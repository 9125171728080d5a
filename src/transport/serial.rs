use std::io::ErrorKind;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use super::{ByteChannel, DEFAULT_DRAIN_INTERVAL};
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Serial port binding. The port is opened on [`ByteChannel::open`], not at
/// construction.
pub struct SerialChannel {
    port: String,
    baud_rate: u32,
    drain_interval: Duration,
    stream: Option<SerialStream>,
}

impl SerialChannel {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            stream: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.port.clone(), config.baud_rate)
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> Result<&mut SerialStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

impl ByteChannel for SerialChannel {
    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        if self.port.is_empty() {
            return Err(Error::Configuration("Serial port must be specified".into()));
        }

        let stream = tokio_serial::new(&self.port, self.baud_rate).open_native_async()?;
        info!("Opened {} at {} baud", self.port, self.baud_rate);
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.flush().await?;
            info!("Closed {}", self.port);
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.stream()?.write(data).await?)
    }

    fn bytes_pending(&mut self) -> Result<usize> {
        Ok(self.stream()?.bytes_to_write()? as usize)
    }

    async fn read_available(&mut self, max_bytes: usize, wait: Duration) -> Result<Option<Bytes>> {
        let stream = self.stream()?;
        let mut buf = vec![0u8; max_bytes];

        let result = timeout(wait, stream.read(&mut buf)).await;
        match result {
            Err(_) => Ok(Some(Bytes::new())),
            Ok(Ok(0)) => {
                debug!("{} reached end of stream", self.port);
                Ok(None)
            }
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => Ok(Some(Bytes::new())),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    async fn drain_pause(&mut self) {
        sleep(self.drain_interval).await;
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}
