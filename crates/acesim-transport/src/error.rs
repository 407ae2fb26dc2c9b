use std::path::PathBuf;

/// Errors that can occur while managing the virtual serial endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The pseudo-terminal pair could not be allocated.
    #[error("failed to open pseudo-terminal: {0}")]
    OpenPty(std::io::Error),

    /// Terminal attributes or descriptor flags could not be applied.
    #[error("failed to configure pseudo-terminal: {0}")]
    Configure(std::io::Error),

    /// The consumer side's device path could not be resolved.
    #[error("failed to resolve device path of fd {fd}: {source}")]
    ResolvePath { fd: i32, source: std::io::Error },

    /// A stale link at the discovery path could not be inspected or removed.
    #[error("failed to clear stale path {path}: {source}")]
    StalePath {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The discovery path is occupied by something other than a symlink.
    #[error("refusing to replace {path}: existing path is not a symlink")]
    NotALink { path: PathBuf },

    /// The discovery symlink could not be created.
    #[error("failed to link {path} -> {target}: {source}")]
    Link {
        path: PathBuf,
        target: PathBuf,
        source: std::io::Error,
    },

    /// The discovery symlink could not be removed.
    #[error("failed to unlink {path}: {source}")]
    Unlink {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the controller side.
    #[error("endpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// The underlying I/O error, if any.
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            TransportError::OpenPty(source)
            | TransportError::Configure(source)
            | TransportError::Io(source)
            | TransportError::ResolvePath { source, .. }
            | TransportError::StalePath { source, .. }
            | TransportError::Link { source, .. }
            | TransportError::Unlink { source, .. } => Some(source),
            TransportError::NotALink { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
