#![doc(html_root_url = "https://docs.rs/wsgate/latest")]
//! Public API for the `wsgate` library.
//!
//! This crate provides the connection-level core of a WebSocket transport:
//! frame classification, fragment routing, the close handshake, idle and
//! fault handling, and an actor that serialises all of it per connection.
//! Pipelined HTTP responses are kept in request order by [`http`].

pub mod config;
pub mod driver;
pub mod frame;
pub mod handler;
pub mod http;
pub mod message;
pub mod metrics;
pub mod session;
pub mod sink;
pub mod transport;

pub use config::{ConfigError, ConnectionConfig, PipelineConfig};
pub use driver::{
    ConnectionDriver,
    ConnectionError,
    InboundEvent,
    InboundEvents,
    WsConnection,
    active_session_count,
};
pub use frame::{CloseCode, CloseFrame, FrameError, InboundFrame, Opcode, RawFrame, classify};
pub use handler::{
    ClientFrameHandler,
    CloseError,
    ClosePhase,
    FrameStateMachine,
    IdleState,
    InboundFrameHandler,
    PendingClose,
    ServerFrameHandler,
    TransportFault,
    handler_for,
};
pub use message::{ConnectionInfo, ControlSignal, Message, Payload, Role, SessionId};
pub use session::SessionRegistry;
pub use sink::{ChannelSink, MessageSink, Notification};
pub use transport::{ChannelWriter, FrameWriter, OutboundFrame, OutboundReceiver, WriteFuture};
