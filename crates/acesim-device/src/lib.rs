//! The emulated peripheral: session, watchdog and restart cycle.
//!
//! One *cycle* is the lifetime of a [`VirtualSerialEndpoint`], a [`Session`]
//! reading frames from it, and a [`Watchdog`] that expires when the host
//! stops sending frames. The [`Orchestrator`] races the session against the
//! watchdog, tears the endpoint down when either ends, and starts over.
//!
//! [`VirtualSerialEndpoint`]: acesim_transport::VirtualSerialEndpoint

pub mod config;
pub mod cycle;
pub mod error;
pub mod responder;
pub mod session;
pub mod stats;
pub mod watchdog;

pub use config::{
    DeviceConfig, ResponseMode, DEFAULT_ACK, DEFAULT_DEVICE_NAME, DEFAULT_READ_CHUNK_SIZE,
    DEFAULT_RESTART_BACKOFF, DEFAULT_WATCHDOG_TIMEOUT, RUNTIME_DIR_ENV,
};
pub use cycle::{CycleEnd, Orchestrator};
pub use error::{DeviceError, Result};
pub use responder::{AckResponder, EchoResponder, Framed, Responder};
pub use session::Session;
pub use stats::{DeviceStats, StatsSnapshot};
pub use watchdog::{PingSignal, Watchdog, WatchdogOutcome};
