mod common;

use std::cell::RefCell;
use std::rc::Rc;

use ciborium::Value;
use common::{config, connect, rc, FileSystem, Reply};
use smpclient::protocols::smp::{Body, Header};
use smpclient::{Error, ImageTarget, Result};
use tokio_stream::{Stream, StreamExt};

async fn drain<T>(stream: impl Stream<Item = Result<T>>) -> Vec<Result<T>> {
    tokio::pin!(stream);
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }
    items
}

fn offsets(items: Vec<Result<u64>>) -> Vec<u64> {
    items.into_iter().map(|item| item.unwrap()).collect()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// Acknowledges every chunk in full and records the offsets it was sent.
fn recording_device(
    seen: Rc<RefCell<Vec<u64>>>,
    mut answer: impl FnMut(u64, u64) -> Body,
) -> impl FnMut(&Header, Body) -> Reply {
    move |_header: &Header, mut body: Body| {
        let off = body.require_u64("off").unwrap();
        let len = body.take_bytes("data").unwrap().unwrap_or_default().len() as u64;
        seen.borrow_mut().push(off);
        Reply::Respond(answer(off, off + len))
    }
}

#[tokio::test]
async fn upload_yields_offset_after_every_chunk() {
    let data = pattern(1000);
    let mut client = connect(FileSystem::new(), config().with_chunk_size(300)).await;

    let items = drain(client.upload_file("/lfs/data.bin", &data)).await;
    assert_eq!(offsets(items), vec![300, 600, 900, 1000]);

    let device = &client.channel().device;
    assert_eq!(device.upload_offsets, vec![0, 300, 600, 900]);
    assert_eq!(device.files["/lfs/data.bin"], data);
}

#[tokio::test]
async fn chunk_count_matches_length_over_chunk_size() {
    for (len, chunk) in [(1usize, 1usize), (10, 3), (1024, 256), (777, 100), (300, 300)] {
        let data = pattern(len);
        let mut client = connect(FileSystem::new(), config().with_chunk_size(chunk)).await;

        let progress = offsets(drain(client.upload_file("/lfs/f", &data)).await);
        assert_eq!(progress.len(), len.div_ceil(chunk), "len {len}, chunk {chunk}");
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(progress.last(), Some(&(len as u64)));
    }
}

#[tokio::test]
async fn default_chunks_fill_the_message_budget() {
    let data = pattern(5000);
    let mut client = connect(FileSystem::new(), config()).await;
    let budget = client.max_payload_size();

    let progress = offsets(drain(client.upload_file("/lfs/big.bin", &data)).await);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(progress.last(), Some(&5000));

    let channel = client.channel();
    assert_eq!(channel.frame_sizes.len(), progress.len());
    assert!(channel.frame_sizes.iter().all(|size| *size <= budget));
    assert!(channel.frame_sizes[1..channel.frame_sizes.len() - 1]
        .iter()
        .any(|size| budget - size < 4));
    assert_eq!(channel.device.files["/lfs/big.bin"], data);
}

#[tokio::test]
async fn device_offset_overrides_chunk_end() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let device = recording_device(seen.clone(), |off, end| {
        let acknowledged = if off == 0 { 100 } else { end };
        Body::new().with("off", acknowledged)
    });
    let mut client = connect(device, config().with_chunk_size(300)).await;

    let data = pattern(1000);
    let progress = offsets(drain(client.upload_file("/lfs/data.bin", &data)).await);
    assert_eq!(progress, vec![100, 400, 700, 1000]);
    assert_eq!(*seen.borrow(), vec![0, 100, 400, 700]);
}

#[tokio::test]
async fn device_error_stops_upload_with_failing_offset() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let device = recording_device(seen.clone(), |off, end| {
        if off == 300 {
            rc(5)
        } else {
            Body::new().with("off", end)
        }
    });
    let mut client = connect(device, config().with_chunk_size(300)).await;

    let data = pattern(1000);
    let mut items = drain(client.upload_file("/lfs/data.bin", &data)).await;
    assert_eq!(items.len(), 2);

    match items.pop().unwrap() {
        Err(Error::Transfer { offset, source }) => {
            assert_eq!(offset, 300);
            assert!(matches!(*source, Error::Device { rc: 5, .. }));
        }
        other => panic!("unexpected item: {other:?}"),
    }
    assert_eq!(items.pop().unwrap().unwrap(), 300);
    assert!(client.is_connected());
}

#[tokio::test]
async fn upload_gives_up_when_device_never_advances() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let device = recording_device(seen.clone(), |_, _| Body::new().with("off", 0u64));
    let mut client = connect(device, config().with_chunk_size(300).with_max_retries(3)).await;

    let data = pattern(1000);
    let items = drain(client.upload_file("/lfs/data.bin", &data)).await;
    assert_eq!(items.len(), 4);
    assert!(items[..3].iter().all(|item| matches!(item, Ok(0))));
    assert!(matches!(
        items[3],
        Err(Error::Transfer { offset: 0, ref source }) if matches!(**source, Error::Protocol(_))
    ));
    assert_eq!(seen.borrow().len(), 4);
}

#[tokio::test]
async fn empty_upload_sends_nothing() {
    let mut client = connect(FileSystem::new(), config()).await;
    let items = drain(client.upload_file("/lfs/empty", &[])).await;
    assert!(items.is_empty());
    assert!(client.channel().headers.is_empty());
}

#[tokio::test]
async fn image_upload_sends_length_up_front() {
    let data = pattern(2000);
    let mut client = connect(FileSystem::new(), config()).await;

    let progress = offsets(drain(client.upload_image(ImageTarget::new().with_image(0), &data)).await);
    assert_eq!(progress.last(), Some(&2000));

    let device = &client.channel().device;
    assert_eq!(device.image, data);
    assert_eq!(device.image_len, Some(2000));
}

#[tokio::test]
async fn download_yields_chunks_with_offsets() {
    let data = pattern(1000);
    let device = FileSystem::new().with_file("/lfs/log.txt", data.clone());
    let mut client = connect(device, config()).await;

    let items = drain(client.download_file("/lfs/log.txt")).await;
    let chunks: Vec<_> = items.into_iter().map(|item| item.unwrap()).collect();
    let progress: Vec<u64> = chunks.iter().map(|(_, offset)| *offset).collect();
    assert_eq!(progress, vec![256, 512, 768, 1000]);

    let received: Vec<u8> = chunks.iter().flat_map(|(chunk, _)| chunk.to_vec()).collect();
    assert_eq!(received, data);
}

#[tokio::test]
async fn read_file_collects_download() {
    let data = pattern(700);
    let device = FileSystem::new()
        .with_file("/lfs/a.bin", data.clone())
        .with_file("/lfs/empty", Vec::new());
    let mut client = connect(device, config()).await;

    assert_eq!(client.read_file("/lfs/a.bin").await.unwrap(), data);
    assert!(client.read_file("/lfs/empty").await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_file_fails_at_offset_zero() {
    let mut client = connect(FileSystem::new(), config()).await;
    let items = drain(client.download_file("/lfs/nope")).await;
    assert_eq!(items.len(), 1);
    assert!(matches!(
        items[0],
        Err(Error::Transfer { offset: 0, ref source }) if matches!(**source, Error::Device { rc: 2, .. })
    ));
}

#[tokio::test]
async fn download_longer_than_announced_is_rejected() {
    let device = |_header: &Header, mut body: Body| {
        let off = body.require_u64("off").unwrap();
        Reply::Respond(
            Body::new()
                .with("off", off)
                .with("len", 4u64)
                .with("data", Value::Bytes(vec![0; 8])),
        )
    };
    let mut client = connect(device, config()).await;

    let items = drain(client.download_file("/lfs/x")).await;
    assert!(matches!(
        items.last(),
        Some(Err(Error::Transfer { offset: 0, source })) if matches!(**source, Error::Protocol(_))
    ));
}

/// Serves `content` in 20-byte chunks, announcing `len` only if given.
fn chunked_device(content: Vec<u8>, len: Option<u64>) -> impl FnMut(&Header, Body) -> Reply {
    move |_header: &Header, mut body: Body| {
        let off = body.require_u64("off").unwrap();
        let start = (off as usize).min(content.len());
        let end = (start + 20).min(content.len());
        let mut response = Body::new()
            .with("off", off)
            .with("data", Value::Bytes(content[start..end].to_vec()));
        if let (0, Some(len)) = (off, len) {
            response.insert("len", len);
        }
        Reply::Respond(response)
    }
}

#[tokio::test]
async fn download_without_length_ends_on_empty_data() {
    let data = pattern(90);
    let mut client = connect(chunked_device(data.clone(), None), config()).await;

    let items = drain(client.download_file("/lfs/stream.log")).await;
    let chunks: Vec<_> = items.into_iter().map(|item| item.unwrap()).collect();
    let progress: Vec<u64> = chunks.iter().map(|(_, offset)| *offset).collect();
    assert_eq!(progress, vec![20, 40, 60, 80, 90]);

    assert_eq!(client.read_file("/lfs/stream.log").await.unwrap(), data);
    assert_eq!(client.channel().headers.len(), 12);
}

#[tokio::test]
async fn download_with_length_stops_once_reached() {
    let data = pattern(60);
    let mut client = connect(chunked_device(data.clone(), Some(60)), config()).await;

    assert_eq!(client.read_file("/lfs/a.bin").await.unwrap(), data);
    assert_eq!(client.channel().headers.len(), 3);
}

#[tokio::test]
async fn download_ends_cleanly_when_device_runs_dry_before_length() {
    let data = pattern(50);
    let mut client = connect(chunked_device(data.clone(), Some(100)), config()).await;

    let items = drain(client.download_file("/lfs/short.bin")).await;
    let progress: Vec<u64> = items.into_iter().map(|item| item.unwrap().1).collect();
    assert_eq!(progress, vec![20, 40, 50]);
}

#[tokio::test]
async fn transfer_error_from_bad_sequence_is_fatal() {
    let device = |header: &Header, _body: Body| {
        Reply::RespondAs(header.sequence.wrapping_add(3), Body::new().with("off", 0u64))
    };
    let mut client = connect(device, config()).await;

    let data = pattern(100);
    let items = drain(client.upload_file("/lfs/data.bin", &data)).await;
    let err = match items.into_iter().last() {
        Some(Err(err)) => err,
        other => panic!("unexpected item: {other:?}"),
    };
    assert!(matches!(err, Error::Transfer { offset: 0, .. }));
    assert!(err.is_fatal());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn verify_compares_device_checksum() {
    let data = pattern(1500);
    let mut client = connect(FileSystem::new(), config()).await;

    drain(client.upload_file("/lfs/fw.bin", &data)).await;
    client.verify_file("/lfs/fw.bin", &data).await.unwrap();

    let mut other = data.clone();
    other[10] ^= 0xFF;
    let err = client.verify_file("/lfs/fw.bin", &other).await.unwrap_err();
    assert!(matches!(err, Error::VerificationFailed { .. }));
}
