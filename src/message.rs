//! Application-visible messages and the connection metadata stamped on them.
//!
//! Every [`Message`] carries an [`Arc<ConnectionInfo>`] so listeners can tell
//! which session, path and listener interface it arrived on without holding
//! a reference to the connection itself.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;

use crate::frame::CloseCode;

/// Identifier assigned to a WebSocket session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl From<u64> for SessionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl SessionId {
    /// Create a new [`SessionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Allocate the next process-unique identifier.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// Which side of the handshake this endpoint played.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accepted the upgrade.
    Server,
    /// Initiated the upgrade.
    Client,
}

impl Role {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

/// Read-only metadata fixed when a connection is established.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    session_id: SessionId,
    role: Role,
    secure: bool,
    target: String,
    interface_id: String,
    local_name: String,
    local_addr: SocketAddr,
}

impl ConnectionInfo {
    /// Describe a newly established connection with a fresh session id.
    #[must_use]
    pub fn new(
        role: Role,
        target: impl Into<String>,
        interface_id: impl Into<String>,
        local_addr: SocketAddr,
    ) -> Self {
        Self {
            session_id: SessionId::next(),
            role,
            secure: false,
            target: target.into(),
            interface_id: interface_id.into(),
            local_name: local_addr.ip().to_string(),
            local_addr,
        }
    }

    /// Mark the connection as running over an encrypted transport.
    #[must_use]
    pub fn secured(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Record the host name the local address was bound under. Defaults to
    /// the textual form of the local IP address.
    #[must_use]
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }

    /// Override the generated session id.
    #[must_use]
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId { self.session_id }

    #[must_use]
    pub fn role(&self) -> Role { self.role }

    /// Whether the transport is encrypted.
    #[must_use]
    pub fn is_secure(&self) -> bool { self.secure }

    /// Request path the upgrade targeted.
    #[must_use]
    pub fn target(&self) -> &str { &self.target }

    /// Identifier of the listener interface that accepted the connection.
    #[must_use]
    pub fn interface_id(&self) -> &str { &self.interface_id }

    /// Host name of the local end of the connection.
    #[must_use]
    pub fn local_name(&self) -> &str { &self.local_name }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.local_addr }

    #[must_use]
    pub fn local_port(&self) -> u16 { self.local_addr.port() }
}

/// Signals carried by control messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    Ping,
    Pong,
    /// No traffic within the configured idle window. The connection is
    /// still alive.
    IdleTimeout,
}

/// Body of an application message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Text, or one fragment of a fragmented text message.
    Text { text: String, final_fragment: bool },
    /// Bytes, or one fragment of a fragmented binary message.
    Binary { data: Bytes, final_fragment: bool },
    /// Ping, pong or idle-timeout signal. Idle timeouts carry no data.
    Control { signal: ControlSignal, data: Option<Bytes> },
    /// Close frame from the peer, or an abnormal closure synthesised locally.
    Close { code: CloseCode, reason: Option<String> },
}

/// Unit delivered to a [`MessageSink`](crate::sink::MessageSink).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    connection: Arc<ConnectionInfo>,
    payload: Payload,
}

impl Message {
    /// Stamp `payload` with the connection metadata.
    #[must_use]
    pub fn new(connection: Arc<ConnectionInfo>, payload: Payload) -> Self {
        Self {
            connection,
            payload,
        }
    }

    /// Metadata of the connection the message arrived on.
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionInfo> { &self.connection }

    #[must_use]
    pub fn payload(&self) -> &Payload { &self.payload }

    #[must_use]
    pub fn into_payload(self) -> Payload { self.payload }

    #[must_use]
    pub fn session_id(&self) -> SessionId { self.connection.session_id() }

    #[must_use]
    pub fn target(&self) -> &str { self.connection.target() }

    #[must_use]
    pub fn interface_id(&self) -> &str { self.connection.interface_id() }

    #[must_use]
    pub fn is_secure(&self) -> bool { self.connection.is_secure() }

    #[must_use]
    pub fn local_name(&self) -> &str { self.connection.local_name() }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.connection.local_addr() }

    /// Whether this message completes its logical message. Control and close
    /// messages are always final.
    #[must_use]
    pub fn is_final_fragment(&self) -> bool {
        match &self.payload {
            Payload::Text { final_fragment, .. } | Payload::Binary { final_fragment, .. } => {
                *final_fragment
            }
            Payload::Control { .. } | Payload::Close { .. } => true,
        }
    }

    /// Close status code, for close messages.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match &self.payload {
            Payload::Close { code, .. } => Some(*code),
            _ => None,
        }
    }
}
