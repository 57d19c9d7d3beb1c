//! Builds application messages stamped with connection metadata.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    frame::CloseCode,
    message::{ConnectionInfo, ControlSignal, Message, Payload},
};

/// Produces [`Message`]s for one connection.
#[derive(Clone, Debug)]
pub struct MessageAssembler {
    connection: Arc<ConnectionInfo>,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(connection: Arc<ConnectionInfo>) -> Self { Self { connection } }

    /// Metadata stamped on every message.
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionInfo> { &self.connection }

    fn stamp(&self, payload: Payload) -> Message { Message::new(Arc::clone(&self.connection), payload) }

    #[must_use]
    pub fn text(&self, text: String, final_fragment: bool) -> Message {
        self.stamp(Payload::Text {
            text,
            final_fragment,
        })
    }

    #[must_use]
    pub fn binary(&self, data: Bytes, final_fragment: bool) -> Message {
        self.stamp(Payload::Binary {
            data,
            final_fragment,
        })
    }

    #[must_use]
    pub fn control(&self, signal: ControlSignal, data: Option<Bytes>) -> Message {
        self.stamp(Payload::Control { signal, data })
    }

    #[must_use]
    pub fn close(&self, code: CloseCode, reason: Option<String>) -> Message {
        self.stamp(Payload::Close { code, reason })
    }

    /// Close message reported when the transport ended without a handshake.
    #[must_use]
    pub fn abnormal_closure(&self) -> Message { self.close(CloseCode::ABNORMAL_CLOSURE, None) }
}
