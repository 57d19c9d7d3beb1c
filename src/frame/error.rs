//! Errors raised while interpreting inbound frames.

use thiserror::Error;

/// Failures that make the current read uninterpretable.
///
/// These are fatal for the frame being processed. The driver routes them into
/// the fault path so the application is told exactly once.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The opcode is not one the core understands.
    #[error("unrecognised websocket frame kind: opcode {opcode:#x}")]
    UnrecognizedFrameKind {
        /// Opcode found on the frame.
        opcode: u8,
    },
    /// A continuation frame arrived with no fragmented message open.
    #[error("continuation frame received without a preceding non-final text or binary frame")]
    OrphanContinuation,
    /// Text payload is not valid UTF-8.
    #[error("text frame payload is not valid UTF-8")]
    InvalidUtf8,
    /// Close payload is one byte long and cannot hold a status code.
    #[error("close frame payload of {len} byte(s) cannot carry a status code")]
    MalformedClosePayload {
        /// Length of the offending payload.
        len: usize,
    },
    /// Close reason is not valid UTF-8.
    #[error("close frame reason is not valid UTF-8")]
    InvalidCloseReason,
}
