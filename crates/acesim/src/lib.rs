//! Emulated serial peripheral behind a pseudo-terminal.
//!
//! The emulator exposes a pseudo-terminal through a symlink in the user's
//! runtime directory, answers CRC-checked frames written to it, and tears
//! the endpoint down and recreates it whenever the host goes quiet.
//!
//! # Crate Structure
//!
//! - [`frame`] — CRC-16/MCRF4XX, wire encoding and the incremental frame parser
//! - [`transport`] — pseudo-terminal pair and the discoverable virtual serial endpoint
//! - [`device`] — session, watchdog and the restart cycle

/// Re-export frame types.
pub mod frame {
    pub use acesim_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use acesim_transport::*;
}

/// Re-export device types.
pub mod device {
    pub use acesim_device::*;
}

pub use acesim_device::{DeviceConfig, DeviceError, Orchestrator};
pub use acesim_frame::{crc16, encode_frame, Frame, FrameParser};
pub use acesim_transport::VirtualSerialEndpoint;
