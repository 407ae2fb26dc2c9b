/// Errors that can occur during frame encoding/parsing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the 16-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The parser reached a state its transitions cannot produce.
    ///
    /// This is a programming defect, never a consequence of wire input.
    #[error("frame parser reached an inconsistent state: {0}")]
    InconsistentState(&'static str),
}

pub type Result<T> = std::result::Result<T, FrameError>;
