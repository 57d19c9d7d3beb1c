//! Notification sink contract between the connection core and the
//! application layer.
//!
//! The core calls a [`MessageSink`] synchronously from the connection's
//! serialized context, in the order events were processed. Implementations
//! must not block; hand work off to another task if it may take a while.
//! [`ChannelSink`] does exactly that over an unbounded channel.

use std::sync::Arc;

use log::warn;
use tokio::sync::mpsc;

use crate::{
    handler::TransportFault,
    message::{ConnectionInfo, Message},
};

/// Receiver of application-visible connection events.
pub trait MessageSink: Send + Sync + 'static {
    /// Deliver a text, binary, control or close message.
    fn deliver(&self, message: Message);

    /// Deliver an idle-timeout control message. The connection is still open.
    fn deliver_idle_timeout(&self, message: Message);

    /// Report a transport fault that ended `connection`.
    fn deliver_fault(&self, connection: Arc<ConnectionInfo>, fault: TransportFault);
}

/// Event recorded by [`ChannelSink`].
#[derive(Debug)]
pub enum Notification {
    Message(Message),
    IdleTimeout(Message),
    Fault {
        connection: Arc<ConnectionInfo>,
        fault: TransportFault,
    },
}

impl Notification {
    /// The message carried by the notification, if any.
    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) | Self::IdleTimeout(message) => Some(message),
            Self::Fault { .. } => None,
        }
    }

    /// Whether this is a fault notification.
    #[must_use]
    pub fn is_fault(&self) -> bool { matches!(self, Self::Fault { .. }) }
}

/// [`MessageSink`] forwarding every event into an unbounded channel.
///
/// Sending never blocks, so the frame-processing path is never starved, and
/// channel order preserves delivery order.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Create a sink and the receiver the application reads from.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: Notification) {
        if let Err(mpsc::error::SendError(dropped)) = self.tx.send(notification) {
            warn!("notification dropped, listener gone: notification={dropped:?}");
        }
    }
}

impl MessageSink for ChannelSink {
    fn deliver(&self, message: Message) { self.forward(Notification::Message(message)); }

    fn deliver_idle_timeout(&self, message: Message) {
        self.forward(Notification::IdleTimeout(message));
    }

    fn deliver_fault(&self, connection: Arc<ConnectionInfo>, fault: TransportFault) {
        self.forward(Notification::Fault { connection, fault });
    }
}
