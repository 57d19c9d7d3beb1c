//! Transport faults and idle signals raised by the I/O substrate.

use std::io;

use thiserror::Error;

use crate::frame::FrameError;

/// Lower-layer failure on a connection.
#[derive(Debug, Error)]
pub enum TransportFault {
    /// The inbound byte stream could not be interpreted. The transport is
    /// still writable, so a close frame is attempted before closing it.
    #[error("corrupted frame: {0}")]
    CorruptedFrame(#[from] FrameError),
    /// The peer reset the connection.
    #[error("connection reset by peer")]
    Reset,
    /// Any other I/O failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportFault {
    /// Whether a close frame should still be written before closing.
    #[must_use]
    pub fn is_recoverable(&self) -> bool { matches!(self, Self::CorruptedFrame(_)) }

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CorruptedFrame(_) => "corrupted_frame",
            Self::Reset => "reset",
            Self::Io(_) => "io",
        }
    }
}

/// Keepalive signal from the substrate's idle detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdleState {
    /// Nothing was read within the window.
    ReaderIdle,
    /// Nothing was written within the window.
    WriterIdle,
    /// Neither read nor write activity within the window.
    AllIdle,
}
