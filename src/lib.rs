//! SMP (MCUmgr) Client Library
//!
//! This library talks to embedded devices that implement the Simple
//! Management Protocol, over a serial link or any other byte channel.
//!
//! # Features
//! - Serial line framing with base64 fragments and CRC-16 checks
//! - Flow-controlled sending that waits for the output buffer to drain
//! - Request/response matching by sequence number, with timeout and resume
//! - Chunked file and image uploads with device offset reconciliation
//! - File downloads and CRC32 verification
//! - Intel HEX firmware file loading
//!
//! # Protocol Stack
//! - Management commands (OS, image, file system groups)
//! - SMP messages (8-byte header + CBOR body)
//! - Serial framing (length, payload, CRC-16, base64 lines)
//!
//! # Examples
//!
//! ## Uploading a File
//! ```rust,no_run
//! use smpclient::ClientConfig;
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> smpclient::Result<()> {
//!     let config = ClientConfig::new()
//!         .with_port("/dev/ttyACM0")
//!         .with_mtu(512);
//!
//!     let mut client = smpclient::connect_serial(config).await?;
//!     let data = std::fs::read("settings.bin")?;
//!
//!     let upload = client.upload_file("/lfs/settings.bin", &data);
//!     tokio::pin!(upload);
//!     while let Some(offset) = upload.next().await {
//!         println!("{} / {}", offset?, data.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Uploading a Firmware Image
//! ```rust,no_run
//! use smpclient::{ClientConfig, ImageTarget};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> smpclient::Result<()> {
//!     let config = ClientConfig::new().with_port("/dev/ttyACM0");
//!     let mut client = smpclient::connect_serial(config).await?;
//!     let image = smpclient::firmware::load_image("zephyr.hex").await?;
//!
//!     let upload = client.upload_image(ImageTarget::new().with_image(0), &image);
//!     tokio::pin!(upload);
//!     while let Some(offset) = upload.next().await {
//!         offset?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod firmware;
pub mod link;
pub mod protocols;
pub mod transfer;
pub mod transport;

pub use client::SmpClient;
pub use config::ClientConfig;
pub use error::{Error, ErrorKind, Result};
pub use protocols::smp::{Body, Request, Response};
pub use transfer::{FileTarget, ImageTarget, TransferState, UploadTarget};
pub use transport::{ByteChannel, MemoryChannel, SerialChannel};

/// Opens the serial port named in `config` and connects a client over it.
pub async fn connect_serial(config: ClientConfig) -> Result<SmpClient<SerialChannel>> {
    let channel = SerialChannel::from_config(&config);
    let mut client = SmpClient::new(channel, config)?;
    client.connect().await?;
    Ok(client)
}

/// Creates a new client configuration with default settings
pub fn new_config() -> ClientConfig {
    ClientConfig::new()
}
