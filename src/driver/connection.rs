//! Application handle to a running connection.

use std::{io, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::{
    frame::CloseCode,
    handler::{CloseError, PendingClose},
    message::{ConnectionInfo, SessionId},
    transport::{OutboundFrame, WriteFuture},
};

/// Failures of outbound operations on a [`WsConnection`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection driver has stopped.
    #[error("connection driver has stopped")]
    Closed,
    /// A close handshake is in progress; data frames may no longer be sent.
    #[error("close handshake in progress")]
    Closing,
    /// The transport rejected the write.
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

pub(super) enum Command {
    Send {
        frame: OutboundFrame,
        reply: oneshot::Sender<Result<WriteFuture, ConnectionError>>,
    },
    Close {
        code: CloseCode,
        reason: Option<String>,
        reply: oneshot::Sender<Result<(PendingClose, WriteFuture), CloseError>>,
    },
    CloseWriteFailed(CloseError),
    FinishClose {
        code: CloseCode,
        reason: Option<String>,
        reply: oneshot::Sender<WriteFuture>,
    },
}

/// Cloneable handle used by the application to talk to a connection.
///
/// Every operation is forwarded to the connection's driver task, so close
/// state only ever changes on that task.
#[derive(Clone, Debug)]
pub struct WsConnection {
    info: Arc<ConnectionInfo>,
    commands: mpsc::Sender<Command>,
}

impl WsConnection {
    pub(super) fn new(info: Arc<ConnectionInfo>, commands: mpsc::Sender<Command>) -> Self {
        Self { info, commands }
    }

    /// Metadata fixed at connection establishment.
    #[must_use]
    pub fn info(&self) -> &Arc<ConnectionInfo> { &self.info }

    #[must_use]
    pub fn session_id(&self) -> SessionId { self.info.session_id() }

    #[must_use]
    pub fn target(&self) -> &str { self.info.target() }

    #[must_use]
    pub fn interface_id(&self) -> &str { self.info.interface_id() }

    #[must_use]
    pub fn is_secure(&self) -> bool { self.info.is_secure() }

    #[must_use]
    pub fn local_name(&self) -> &str { self.info.local_name() }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.info.local_addr() }

    #[must_use]
    pub fn local_port(&self) -> u16 { self.info.local_port() }

    /// Whether the driver task has finished.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.commands.is_closed() }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closing`] once this side initiated a close,
    /// [`ConnectionError::Closed`] if the driver has stopped and
    /// [`ConnectionError::Io`] if the write fails.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        self.send(OutboundFrame::Text(text.into())).await
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closing`] once this side initiated a close,
    /// [`ConnectionError::Closed`] if the driver has stopped and
    /// [`ConnectionError::Io`] if the write fails.
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), ConnectionError> {
        self.send(OutboundFrame::Binary(data.into())).await
    }

    /// Send a ping.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closing`] once this side initiated a close,
    /// [`ConnectionError::Closed`] if the driver has stopped and
    /// [`ConnectionError::Io`] if the write fails.
    pub async fn ping(&self, data: impl Into<Bytes>) -> Result<(), ConnectionError> {
        self.send(OutboundFrame::Ping(data.into())).await
    }

    /// Send a pong.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closing`] once this side initiated a close,
    /// [`ConnectionError::Closed`] if the driver has stopped and
    /// [`ConnectionError::Io`] if the write fails.
    pub async fn pong(&self, data: impl Into<Bytes>) -> Result<(), ConnectionError> {
        self.send(OutboundFrame::Pong(data.into())).await
    }

    async fn send(&self, frame: OutboundFrame) -> Result<(), ConnectionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send { frame, reply })
            .await
            .map_err(|_| ConnectionError::Closed)?;
        let write = rx.await.map_err(|_| ConnectionError::Closed)??;
        write.await?;
        Ok(())
    }

    /// Send a close frame and return once it has been written.
    ///
    /// The returned [`PendingClose`] resolves when the peer echoes the close.
    ///
    /// # Errors
    ///
    /// Returns a [`CloseError`] if the handshake cannot be started or the
    /// close frame cannot be written.
    pub async fn begin_close(
        &self,
        code: CloseCode,
        reason: Option<String>,
    ) -> Result<PendingClose, CloseError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Close {
                code,
                reason,
                reply,
            })
            .await
            .map_err(|_| CloseError::Dropped)?;
        let (pending, write) = rx.await.map_err(|_| CloseError::Dropped)??;
        if let Err(e) = write.await {
            let error = CloseError::Write(e.to_string());
            if self
                .commands
                .send(Command::CloseWriteFailed(error.clone()))
                .await
                .is_err()
            {
                return Err(error);
            }
        }
        Ok(pending)
    }

    /// Run a full close handshake.
    ///
    /// # Errors
    ///
    /// Returns a [`CloseError`] if the handshake fails for any reason,
    /// including a mismatched or missing echo.
    pub async fn close(&self, code: CloseCode, reason: Option<String>) -> Result<(), CloseError> {
        self.begin_close(code, reason).await?.await
    }

    /// Echo a close frame received from the peer.
    ///
    /// A server then closes the transport; a client leaves it open for the
    /// server to close.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the driver has stopped and
    /// [`ConnectionError::Io`] if the echo cannot be written.
    pub async fn finish_close(
        &self,
        code: CloseCode,
        reason: Option<String>,
    ) -> Result<(), ConnectionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::FinishClose {
                code,
                reason,
                reply,
            })
            .await
            .map_err(|_| ConnectionError::Closed)?;
        rx.await.map_err(|_| ConnectionError::Closed)?.await?;
        Ok(())
    }
}
