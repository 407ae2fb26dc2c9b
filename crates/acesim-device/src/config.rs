use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{DeviceError, Result};

/// Environment variable naming the per-user runtime directory.
pub const RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";

/// File name of the discovery link inside the runtime directory.
pub const DEFAULT_DEVICE_NAME: &str = "KobraACESimulator";

/// How long the host may stay silent before the cycle restarts.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(3);

/// Pause between tearing one endpoint down and creating the next.
pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(2);

/// Upper bound on a single endpoint read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64;

/// Reply sent for every accepted frame in [`ResponseMode::Ack`].
pub const DEFAULT_ACK: &[u8] = b"WE DID IT";

/// What the device sends back for an accepted frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// A fixed acknowledgement.
    #[default]
    Ack,
    /// The frame payload, unchanged.
    Echo,
}

/// Configuration for the emulated device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Directory holding the discovery link. Empty by default; must be set
    /// before the config validates.
    pub runtime_dir: PathBuf,
    /// File name of the discovery link.
    pub device_name: String,
    /// Silence tolerated before a cycle restarts.
    pub watchdog_timeout: Duration,
    /// Pause between cycles.
    pub restart_backoff: Duration,
    /// Maximum bytes taken from the endpoint per read.
    pub read_chunk_size: usize,
    /// Reply strategy for accepted frames.
    pub response_mode: ResponseMode,
    /// Wrap replies in a wire frame instead of sending raw bytes.
    pub framed_responses: bool,
    /// Reply bytes used by [`ResponseMode::Ack`].
    pub ack_payload: Bytes,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            runtime_dir: PathBuf::new(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            restart_backoff: DEFAULT_RESTART_BACKOFF,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            response_mode: ResponseMode::default(),
            framed_responses: false,
            ack_payload: Bytes::from_static(DEFAULT_ACK),
        }
    }
}

impl DeviceConfig {
    /// Defaults with the runtime directory taken from `XDG_RUNTIME_DIR`.
    pub fn from_env() -> Result<Self> {
        Self::with_runtime_dir(std::env::var_os(RUNTIME_DIR_ENV))
    }

    /// Defaults with an explicit runtime directory; `None` or empty is an error.
    pub fn with_runtime_dir(runtime_dir: Option<OsString>) -> Result<Self> {
        match runtime_dir {
            Some(dir) if !dir.is_empty() => Ok(Self {
                runtime_dir: PathBuf::from(dir),
                ..Self::default()
            }),
            _ => Err(DeviceError::Config(format!(
                "{RUNTIME_DIR_ENV} is not set; cannot place the device link"
            ))),
        }
    }

    /// Full path of the discovery link.
    pub fn device_path(&self) -> PathBuf {
        self.runtime_dir.join(&self.device_name)
    }

    /// Reject settings the device cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.runtime_dir.as_os_str().is_empty() {
            return Err(DeviceError::Config(format!(
                "runtime directory is not set; use {RUNTIME_DIR_ENV} or set it explicitly"
            )));
        }
        if self.device_name.is_empty() || self.device_name.contains('/') {
            return Err(DeviceError::Config(format!(
                "device name must be a plain file name, got {:?}",
                self.device_name
            )));
        }
        if self.watchdog_timeout.is_zero() {
            return Err(DeviceError::Config(
                "watchdog timeout must be greater than zero".to_string(),
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(DeviceError::Config(
                "read chunk size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
