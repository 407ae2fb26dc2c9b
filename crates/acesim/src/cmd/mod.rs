use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use acesim_device::{ResponseMode, DEFAULT_DEVICE_NAME, DEFAULT_READ_CHUNK_SIZE, RUNTIME_DIR_ENV};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod run;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the emulator until interrupted.
    Run(RunArgs),
    /// Write one frame to the device and optionally print the reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ModeArg {
    /// Reply with the fixed acknowledgement.
    Ack,
    /// Reply with the received payload.
    Echo,
}

impl From<ModeArg> for ResponseMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Ack => ResponseMode::Ack,
            ModeArg::Echo => ResponseMode::Echo,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory that receives the device link.
    #[arg(long, value_name = "DIR", env = RUNTIME_DIR_ENV)]
    pub runtime_dir: Option<PathBuf>,
    /// File name of the device link.
    #[arg(long, default_value = DEFAULT_DEVICE_NAME)]
    pub device_name: String,
    /// Restart the endpoint after this long without a frame (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub watchdog_timeout: String,
    /// Pause between tearing an endpoint down and recreating it.
    #[arg(long, default_value = "2s")]
    pub restart_backoff: String,
    /// Bytes requested per endpoint read.
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// What to send back for a valid frame.
    #[arg(long, value_enum, default_value = "ack")]
    pub mode: ModeArg,
    /// Wrap replies in a wire frame.
    #[arg(long)]
    pub framed: bool,
    /// Acknowledgement text used in ack mode.
    #[arg(long)]
    pub ack: Option<String>,
    /// Print device counters on exit.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device path. Default: <runtime-dir>/<device-name>.
    pub path: Option<PathBuf>,
    /// Directory holding the device link when no path is given.
    #[arg(long, value_name = "DIR", env = RUNTIME_DIR_ENV)]
    pub runtime_dir: Option<PathBuf>,
    /// File name of the device link when no path is given.
    #[arg(long, default_value = DEFAULT_DEVICE_NAME)]
    pub device_name: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Corrupt the frame checksum.
    #[arg(long)]
    pub bad_crc: bool,
    /// Wait for a response and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Read the response as a wire frame instead of raw bytes.
    #[arg(long)]
    pub framed: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

/// Single-threaded runtime; the emulator runs on one task.
pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start async runtime", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("bad").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
