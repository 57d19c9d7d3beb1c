//! In-memory connection harness.

use std::{net::SocketAddr, sync::Arc};

use rstest::fixture;
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use wsgate::{
    ChannelSink,
    ChannelWriter,
    ConnectionConfig,
    ConnectionDriver,
    ConnectionInfo,
    FrameStateMachine,
    InboundEvents,
    Notification,
    OutboundFrame,
    OutboundReceiver,
    Payload,
    RawFrame,
    Role,
    TransportFault,
    WsConnection,
    handler_for,
};

/// Target path stamped on harness connections.
pub const TARGET: &str = "/ws";
/// Listener interface stamped on harness connections.
pub const INTERFACE: &str = "test-listener";

/// Running connection with every endpoint exposed to the test.
pub struct SessionHarness {
    /// Application handle.
    pub conn: WsConnection,
    /// Framing-layer event sender.
    pub events: InboundEvents,
    /// Notifications delivered to the application.
    pub notifications: UnboundedReceiver<Notification>,
    /// Frames written towards the peer.
    pub outbound: OutboundReceiver,
    /// Token ending the session.
    pub shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHarness {
    /// Spawn a driver for `role` with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime.
    #[must_use]
    pub fn spawn(role: Role) -> Self { Self::spawn_with(role, &ConnectionConfig::default()) }

    /// Spawn a driver for `role` with `config`.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime or if `config` is invalid.
    #[must_use]
    pub fn spawn_with(role: Role, config: &ConnectionConfig) -> Self {
        let local: SocketAddr = "127.0.0.1:8080".parse().expect("parse address");
        let info = ConnectionInfo::new(role, TARGET, INTERFACE, local);
        let (sink, notifications) = ChannelSink::new();
        let (writer, outbound) = ChannelWriter::new();
        let state = FrameStateMachine::new(Arc::new(info), Arc::new(sink), Arc::new(writer));
        let shutdown = CancellationToken::new();
        let (driver, conn, events) =
            ConnectionDriver::new(handler_for(state), config, shutdown.clone())
                .expect("valid connection config");
        Self {
            conn,
            events,
            notifications,
            outbound,
            shutdown,
            task: tokio::spawn(driver.run()),
        }
    }

    /// Feed `frame` to the driver.
    ///
    /// # Panics
    ///
    /// Panics if the driver has stopped.
    pub async fn frame(&self, frame: RawFrame) {
        self.events.on_frame(frame).await.expect("driver stopped");
    }

    /// Report a transport fault to the driver.
    ///
    /// # Panics
    ///
    /// Panics if the driver has stopped.
    pub async fn fault(&self, fault: TransportFault) {
        self.events.on_fault(fault).await.expect("driver stopped");
    }

    /// Wait for the next notification.
    ///
    /// # Panics
    ///
    /// Panics if the notification channel closed.
    pub async fn next_notification(&mut self) -> Notification {
        self.notifications.recv().await.expect("notification channel closed")
    }

    /// Wait for the next notification and return its payload.
    ///
    /// # Panics
    ///
    /// Panics on a fault notification.
    pub async fn next_payload(&mut self) -> Payload {
        match self.next_notification().await {
            Notification::Message(message) | Notification::IdleTimeout(message) => {
                message.into_payload()
            }
            other @ Notification::Fault { .. } => panic!("unexpected fault: {other:?}"),
        }
    }

    /// Wait for the next frame written towards the peer.
    ///
    /// # Panics
    ///
    /// Panics if every writer is gone.
    pub async fn next_outbound(&mut self) -> OutboundFrame {
        self.outbound.recv().await.expect("outbound channel closed")
    }

    /// Report transport closure and wait for the driver to finish.
    ///
    /// Returns every notification delivered after closure was reported.
    ///
    /// # Panics
    ///
    /// Panics if the driver task panicked.
    pub async fn close_transport(mut self) -> Vec<Notification> {
        // The driver may already be gone after shutdown; that is fine.
        let _ = self.events.on_transport_closed().await;
        (&mut self.task).await.expect("driver task panicked");
        drain_notifications(&mut self.notifications)
    }
}

/// Take every notification currently queued.
pub fn drain_notifications(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn server_session() -> SessionHarness { SessionHarness::spawn(Role::Server) }

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn client_session() -> SessionHarness { SessionHarness::spawn(Role::Client) }
