use std::fmt;
use std::io;

use acesim_device::DeviceError;
use acesim_frame::FrameError;
use acesim_transport::TransportError;

pub const SUCCESS: i32 = 0;
/// Also used when the emulator is interrupted (SIGINT / Ctrl-C).
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => TRANSPORT_ERROR,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let denied = err
        .io_source()
        .is_some_and(|source| source.kind() == io::ErrorKind::PermissionDenied);
    if denied {
        return CliError::new(PERMISSION_DENIED, format!("{context}: {err}"));
    }

    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::OpenPty(_)
        | TransportError::Configure(_)
        | TransportError::ResolvePath { .. } => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn device_error(context: &str, err: DeviceError) -> CliError {
    match err {
        DeviceError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
        DeviceError::Endpoint(err) => transport_error(context, err),
        DeviceError::Frame(err) => frame_error(context, err),
        DeviceError::Io(err) => io_error(context, err),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn config_errors_are_usage_errors() {
        let err = device_error("bad config", DeviceError::Config("nope".to_string()));
        assert_eq!(err.code, USAGE);
        assert_eq!(err.to_string(), "bad config: invalid configuration: nope");
    }

    #[test]
    fn denied_link_maps_to_permission_code() {
        let err = TransportError::Link {
            path: PathBuf::from("/run/user/0/KobraACESimulator"),
            target: PathBuf::from("/dev/pts/3"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(transport_error("link", err).code, PERMISSION_DENIED);
    }

    #[test]
    fn missing_runtime_dir_maps_to_transport_code() {
        let err = TransportError::Link {
            path: PathBuf::from("/nonexistent/KobraACESimulator"),
            target: PathBuf::from("/dev/pts/3"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(transport_error("link", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn missing_device_is_not_confused_with_interrupt() {
        let err = io_error(
            "failed to open /run/user/0/KobraACESimulator",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert_ne!(err.code, FAILURE);
    }

    #[test]
    fn parser_faults_are_internal() {
        let err = device_error(
            "emulator failed",
            DeviceError::Frame(FrameError::InconsistentState("test")),
        );
        assert_eq!(err.code, INTERNAL);
    }
}
