use thiserror::Error;

use crate::session::SessionState;

/// Convenience alias used throughout the crate.
pub type PtuResult<T> = Result<T, PtuError>;

/// Errors produced by the pan-tilt unit driver.
#[derive(Error, Debug)]
pub enum PtuError {
    /// The device did not answer within the request timeout. Transient;
    /// the same command may be retried on the same session.
    #[error("timed out waiting for device response")]
    Timeout,

    /// Transport-level I/O failure. The connection must be reopened.
    #[error("transport failure: {0}")]
    Io(#[from] std::io::Error),

    /// A received frame violated the acknowledgement framing rules.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The device rejected the command with an error message.
    #[error("device error: {0}")]
    Device(String),

    /// A response payload did not decode as the expected numeric type.
    #[error("payload parse failure: {0}")]
    Parse(String),

    /// A caller-supplied value was outside the protocol's accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was invoked in a session state that does not allow it.
    #[error("operation requires the {expected} state, session is {actual:?}")]
    InvalidState {
        /// State the operation needs.
        expected: &'static str,
        /// State the session is actually in.
        actual: SessionState,
    },
}

impl PtuError {
    /// Whether the same operation may be retried on the same session.
    ///
    /// Timeouts and device-reported rejections leave the session usable;
    /// everything else requires caller intervention.
    pub fn is_retriable(&self) -> bool {
        matches!(self, PtuError::Timeout | PtuError::Device(_))
    }
}
