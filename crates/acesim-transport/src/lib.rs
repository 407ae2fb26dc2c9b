//! Virtual serial endpoint for the emulated peripheral.
//!
//! A pseudo-terminal pair stands in for the serial cable: the emulator owns
//! the controller side and drives it asynchronously, while host software
//! opens the consumer side through a symlink at a well-known path.
//!
//! - [`PtyPair`] — raw pseudo-terminal pair, consumer in raw mode
//! - [`PtyController`] — async `AsyncRead`/`AsyncWrite` over the controller side
//! - [`VirtualSerialEndpoint`] — pair + discoverable symlink, with teardown

#[cfg(not(unix))]
compile_error!("acesim-transport requires a Unix pseudo-terminal implementation");

pub mod endpoint;
pub mod error;
pub mod pty;

pub use endpoint::VirtualSerialEndpoint;
pub use error::{Result, TransportError};
pub use pty::{PtyController, PtyPair};
