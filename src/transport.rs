//! Outbound write contract consumed by the connection core.
//!
//! Writes complete asynchronously: [`FrameWriter::write_frame`] hands back a
//! future that resolves once the frame has been accepted by the transport,
//! so continuations can be attached without blocking the caller.

use std::io;

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::frame::{CloseFrame, Opcode, RawFrame};

/// Completion signal of an outbound write or close.
pub type WriteFuture = BoxFuture<'static, io::Result<()>>;

/// Frame written towards the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(CloseFrame),
}

impl OutboundFrame {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Text(_) => Opcode::Text,
            Self::Binary(_) => Opcode::Binary,
            Self::Ping(_) => Opcode::Ping,
            Self::Pong(_) => Opcode::Pong,
            Self::Close(_) => Opcode::Close,
        }
    }

    /// Wire form handed to the framing layer.
    #[must_use]
    pub fn into_raw(self) -> RawFrame {
        match self {
            Self::Text(text) => RawFrame::text(text),
            Self::Binary(data) => RawFrame::binary(data),
            Self::Ping(data) => RawFrame::ping(data),
            Self::Pong(data) => RawFrame::pong(data),
            Self::Close(frame) => RawFrame::close(&frame),
        }
    }
}

/// Write half of a transport.
///
/// Implementations enqueue `frame` before `write_frame` returns, so frames
/// reach the wire in call order no matter when the futures are polled.
pub trait FrameWriter: Send + Sync + 'static {
    /// Queue `frame` for writing.
    fn write_frame(&self, frame: OutboundFrame) -> WriteFuture;

    /// Close the transport.
    fn close(&self) -> WriteFuture;
}

/// [`FrameWriter`] backed by a channel drained by the framing layer.
#[derive(Clone, Debug)]
pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    closed: CancellationToken,
}

/// Framing-layer end of a [`ChannelWriter`].
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<OutboundFrame>,
    closed: CancellationToken,
}

impl ChannelWriter {
    /// Create a writer and the receiver the framing layer drains.
    #[must_use]
    pub fn new() -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        (
            Self {
                tx,
                closed: closed.clone(),
            },
            OutboundReceiver { rx, closed },
        )
    }
}

fn broken_pipe() -> io::Error { io::Error::new(io::ErrorKind::BrokenPipe, "transport closed") }

impl FrameWriter for ChannelWriter {
    fn write_frame(&self, frame: OutboundFrame) -> WriteFuture {
        let result = if self.closed.is_cancelled() {
            Err(broken_pipe())
        } else {
            self.tx.send(frame).map_err(|_| broken_pipe())
        };
        futures::future::ready(result).boxed()
    }

    fn close(&self) -> WriteFuture {
        self.closed.cancel();
        futures::future::ready(Ok(())).boxed()
    }
}

impl OutboundReceiver {
    /// Receive the next written frame, or `None` once every writer is gone.
    pub async fn recv(&mut self) -> Option<OutboundFrame> { self.rx.recv().await }

    /// Take a written frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns the channel error when no frame is queued.
    pub fn try_recv(&mut self) -> Result<OutboundFrame, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Whether the core asked for the transport to be closed.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.is_cancelled() }

    /// Wait until the core closes the transport.
    pub async fn closed(&self) { self.closed.cancelled().await; }

    /// Stop accepting frames; subsequent writes fail.
    pub fn shutdown(&mut self) {
        self.closed.cancel();
        self.rx.close();
    }
}
