/// Errors that end the emulator rather than a single cycle.
///
/// Per-frame problems (bad CRC, undecodable payload) and watchdog expiry
/// never surface here.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The virtual serial endpoint could not be created or torn down.
    #[error("endpoint error: {0}")]
    Endpoint(#[from] acesim_transport::TransportError),

    /// The frame parser hit an internal consistency fault.
    #[error("frame error: {0}")]
    Frame(#[from] acesim_frame::FrameError),

    /// Reading from or writing to the endpoint failed.
    #[error("endpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
