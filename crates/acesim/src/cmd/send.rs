use std::fs::{self, OpenOptions};
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use acesim_frame::{crc16, encode_frame_with_crc, FrameParser};
use acesim_transport::PtyController;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

use crate::cmd::{parse_duration, runtime, SendArgs};
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR,
    USAGE,
};
use crate::output::{print_response, OutputFormat, Response};

/// Quiet period that ends an unframed reply.
const REPLY_SETTLE: Duration = Duration::from_millis(100);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let path = device_path(&args)?;
    let payload = resolve_payload(&args)?;
    let request = encode_request(&payload, args.bad_crc)?;
    let device = open_device(&path)?;

    runtime()?.block_on(exchange(&args, &path, &request, device, wait_timeout, format))
}

async fn exchange(
    args: &SendArgs,
    path: &Path,
    request: &[u8],
    device: OwnedFd,
    wait_timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let mut device = PtyController::new(device)
        .map_err(|err| transport_error("failed to register device", err))?;

    device
        .write_all(request)
        .await
        .map_err(|err| io_error("write failed", err))?;
    device
        .flush()
        .await
        .map_err(|err| io_error("write failed", err))?;
    debug!(path = %path.display(), len = request.len(), bad_crc = args.bad_crc, "frame sent");

    if !args.wait {
        return Ok(SUCCESS);
    }

    let (bytes, crc_valid) = if args.framed {
        let (payload, valid) = read_frame(&mut device, wait_timeout).await?;
        (payload, Some(valid))
    } else {
        (read_reply(&mut device, wait_timeout).await?, None)
    };

    print_response(
        &Response {
            device: path,
            bytes: &bytes,
            crc_valid,
        },
        format,
    );
    Ok(SUCCESS)
}

fn device_path(args: &SendArgs) -> CliResult<PathBuf> {
    if let Some(path) = &args.path {
        return Ok(path.clone());
    }
    match &args.runtime_dir {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.join(&args.device_name)),
        _ => Err(CliError::new(
            USAGE,
            "no device path given and no runtime directory set",
        )),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn encode_request(payload: &[u8], bad_crc: bool) -> CliResult<BytesMut> {
    let mut crc = crc16(payload);
    if bad_crc {
        crc ^= 0xFFFF;
    }
    let mut buf = BytesMut::new();
    encode_frame_with_crc(payload, crc, &mut buf)
        .map_err(|err| frame_error("cannot encode request", err))?;
    Ok(buf)
}

fn open_device(path: &Path) -> CliResult<OwnedFd> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
        .map_err(|err| io_error(&format!("failed to open {}", path.display()), err))?;
    Ok(OwnedFd::from(file))
}

fn no_response(wait: Duration) -> CliError {
    CliError::new(TIMEOUT, format!("no response within {wait:?}"))
}

fn device_closed() -> CliError {
    CliError::new(TRANSPORT_ERROR, "device closed before responding")
}

/// Read an unframed reply: everything that arrives until the line goes quiet.
async fn read_reply<R>(device: &mut R, wait: Duration) -> CliResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut reply = Vec::new();
    let mut chunk = [0u8; 256];

    let read = tokio::time::timeout(wait, device.read(&mut chunk))
        .await
        .map_err(|_| no_response(wait))?
        .map_err(|err| io_error("read failed", err))?;
    if read == 0 {
        return Err(device_closed());
    }
    reply.extend_from_slice(&chunk[..read]);

    while let Ok(read) = tokio::time::timeout(REPLY_SETTLE, device.read(&mut chunk)).await {
        let read = read.map_err(|err| io_error("read failed", err))?;
        if read == 0 {
            break;
        }
        reply.extend_from_slice(&chunk[..read]);
    }
    Ok(reply)
}

/// Read until one complete frame arrives; returns its payload and CRC verdict.
async fn read_frame<R>(device: &mut R, wait: Duration) -> CliResult<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + wait;
    let mut parser = FrameParser::new();
    let mut chunk = [0u8; 256];

    loop {
        let read = tokio::time::timeout_at(deadline, device.read(&mut chunk))
            .await
            .map_err(|_| no_response(wait))?
            .map_err(|err| io_error("read failed", err))?;
        if read == 0 {
            return Err(device_closed());
        }

        let frames = parser
            .feed(&chunk[..read])
            .map_err(|err| frame_error("response parse failed", err))?;
        if let Some(frame) = frames.into_iter().next() {
            let valid = frame.crc_matches();
            return Ok((frame.payload.to_vec(), valid));
        }
    }
}
