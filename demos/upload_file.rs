//! Uploads a file (or firmware image) to a device over a serial port and
//! reports throughput.
//!
//! ```text
//! cargo run --example upload_file -- --port /dev/ttyACM0 firmware.bin /lfs/firmware.bin
//! cargo run --example upload_file -- --port /dev/ttyACM0 --image zephyr.hex
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use log::info;
use smpclient::{firmware, ClientConfig, ImageTarget};
use tokio_stream::StreamExt;

#[derive(Parser, Debug)]
#[command(about = "Upload a file to an SMP device")]
struct Args {
    /// Serial port of the device
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long, default_value_t = 115200)]
    baud: u32,

    #[arg(long, default_value_t = 512)]
    mtu: usize,

    /// Response timeout in milliseconds
    #[arg(long, default_value_t = 2500)]
    timeout: u64,

    /// Upload to image slot 0 instead of the file system
    #[arg(long)]
    image: bool,

    /// Check the uploaded file's CRC32 on the device
    #[arg(long)]
    verify: bool,

    /// Local file to send (raw binary or Intel HEX)
    source: PathBuf,

    /// Destination path on the device file system
    destination: Option<String>,
}

#[tokio::main]
async fn main() -> smpclient::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let Some(port) = args.port.clone() else {
        for port in smpclient::transport::serial::available_ports()? {
            println!("{}", port);
        }
        return Ok(());
    };

    let config = ClientConfig::new()
        .with_port(port)
        .with_baud_rate(args.baud)
        .with_mtu(args.mtu)
        .with_timeout(Duration::from_millis(args.timeout));

    let data = firmware::load_image(&args.source).await?;
    let mut client = smpclient::connect_serial(config).await?;
    let started = Instant::now();

    if args.image {
        let upload = client.upload_image(ImageTarget::new().with_image(0), &data);
        tokio::pin!(upload);
        while let Some(offset) = upload.next().await {
            report(offset?, data.len(), started);
        }
    } else {
        let destination = args.destination.clone().ok_or_else(|| {
            smpclient::Error::Configuration("A destination path is required for file uploads".into())
        })?;

        {
            let upload = client.upload_file(&destination, &data);
            tokio::pin!(upload);
            while let Some(offset) = upload.next().await {
                report(offset?, data.len(), started);
            }
        }

        if args.verify {
            client.verify_file(&destination, &data).await?;
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    info!(
        "Sent {} bytes in {:.2} s ({:.1} KiB/s)",
        data.len(),
        elapsed,
        data.len() as f64 / 1024.0 / elapsed.max(f64::EPSILON)
    );

    client.disconnect().await
}

fn report(offset: u64, total: usize, started: Instant) {
    let rate = offset as f64 / 1024.0 / started.elapsed().as_secs_f64().max(f64::EPSILON);
    info!("Progress: {}% ({} / {} bytes, {:.1} KiB/s)", offset * 100 / total as u64, offset, total, rate);
}
