//! Connection actor serialising every event of one WebSocket session.
//!
//! [`ConnectionDriver::run`] owns the connection's [`InboundFrameHandler`]
//! and processes, on a single task, the inbound events produced by the
//! framing layer and the commands issued through [`WsConnection`] handles. A
//! `tokio::select!` loop with `biased` ordering observes shutdown first, then
//! inbound events, then application commands, and finally the idle timer.

mod connection;
mod counter;

use std::{sync::Arc, time::Duration};

use log::{debug, info};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use self::connection::Command;
pub use self::{
    connection::{ConnectionError, WsConnection},
    counter::active_session_count,
};
use crate::{
    config::{ConfigError, ConnectionConfig},
    frame::RawFrame,
    handler::{ClosePhase, IdleState, InboundFrameHandler, TransportFault},
    session::SessionRegistry,
};

/// Event produced by the framing layer for one connection.
#[derive(Debug)]
pub enum InboundEvent {
    /// A frame was read from the transport.
    Frame(RawFrame),
    /// The transport has closed.
    Closed,
    /// Reading or writing failed.
    Fault(TransportFault),
    /// The framing layer's own idle detector fired.
    Idle(IdleState),
}

/// Framing-layer end of a connection's inbound event channel.
///
/// Dropping every clone counts as transport closure.
#[derive(Clone, Debug)]
pub struct InboundEvents(mpsc::Sender<InboundEvent>);

impl InboundEvents {
    /// Forward `event` to the driver.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the driver has stopped.
    pub async fn send(&self, event: InboundEvent) -> Result<(), ConnectionError> {
        self.0.send(event).await.map_err(|_| ConnectionError::Closed)
    }

    /// Forward a frame read from the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the driver has stopped.
    pub async fn on_frame(&self, frame: RawFrame) -> Result<(), ConnectionError> {
        self.send(InboundEvent::Frame(frame)).await
    }

    /// Report that the transport closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the driver has stopped.
    pub async fn on_transport_closed(&self) -> Result<(), ConnectionError> {
        self.send(InboundEvent::Closed).await
    }

    /// Report a transport fault.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the driver has stopped.
    pub async fn on_fault(&self, fault: TransportFault) -> Result<(), ConnectionError> {
        self.send(InboundEvent::Fault(fault)).await
    }

    /// Report an idle state observed by the framing layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the driver has stopped.
    pub async fn on_idle(&self, state: IdleState) -> Result<(), ConnectionError> {
        self.send(InboundEvent::Idle(state)).await
    }

    /// Whether the driver has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.0.is_closed() }
}

/// Internal representation of the next thing the driver must handle.
enum Event {
    Shutdown,
    Inbound(Option<InboundEvent>),
    Command(Option<Command>),
    IdleTimeout,
}

/// Actor driving one connection.
pub struct ConnectionDriver<H> {
    handler: H,
    events: mpsc::Receiver<InboundEvent>,
    commands: mpsc::Receiver<Command>,
    command_tx: mpsc::WeakSender<Command>,
    commands_open: bool,
    shutdown: CancellationToken,
    idle_timeout: Option<Duration>,
    registry: Option<Arc<SessionRegistry>>,
}

impl<H: InboundFrameHandler> ConnectionDriver<H> {
    /// Create a driver for `handler`.
    ///
    /// Returns the driver, the application's handle and the framing layer's
    /// event sender. Cancelling `shutdown` ends the session as if the
    /// transport had closed.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` is invalid.
    pub fn new(
        handler: H,
        config: &ConnectionConfig,
        shutdown: CancellationToken,
    ) -> Result<(Self, WsConnection, InboundEvents), ConfigError> {
        config.validate()?;
        let (event_tx, events) = mpsc::channel(config.event_capacity);
        let (command_tx, commands) = mpsc::channel(config.command_capacity);
        let handle = WsConnection::new(Arc::clone(handler.connection()), command_tx.clone());
        let driver = Self {
            handler,
            events,
            commands,
            command_tx: command_tx.downgrade(),
            commands_open: true,
            shutdown,
            idle_timeout: config.idle_timeout(),
            registry: None,
        };
        Ok((driver, handle, InboundEvents(event_tx)))
    }

    /// Register the connection in `registry` while the driver runs.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn handler(&self) -> &H { &self.handler }

    /// Process events until the transport closes or shutdown is requested.
    ///
    /// Write continuations spawned by the handler are awaited before this
    /// returns, so every notification has been delivered by then.
    pub async fn run(mut self) {
        let info = Arc::clone(self.handler.connection());
        let span = tracing::info_span!(
            "websocket_session",
            id = info.session_id().as_u64(),
            role = info.role().as_str(),
            target = info.target(),
        );
        async move {
            let (session, active) = counter::ActiveSession::enter(info.session_id());
            info!(
                "websocket session opened: id={}, role={}, target={}, interface={}, secure={}, \
                 local={}@{}, active={active}",
                info.session_id(),
                info.role().as_str(),
                info.target(),
                info.interface_id(),
                info.is_secure(),
                info.local_name(),
                info.local_addr(),
            );
            self.register();
            self.event_loop().await;

            let tasks = self.handler.state().tasks().clone();
            tasks.close();
            tasks.wait().await;
            if let Some(registry) = &self.registry {
                registry.remove(&info.session_id());
            }
            let phase = self.handler.state().close_phase();
            let faulted = self.handler.state().has_caught_fault();
            drop(session);
            let active = active_session_count();
            // Emit via both `log` and `tracing` so span fields reach subscribers.
            info!(
                "websocket session closed: id={}, phase={phase:?}, faulted={faulted}, \
                 active={active}",
                info.session_id(),
            );
            tracing::info!(?phase, faulted, active, "websocket session closed");
        }
        .instrument(span)
        .await;
    }

    fn register(&self) {
        let Some(registry) = &self.registry else {
            return;
        };
        if let Some(tx) = self.command_tx.upgrade() {
            registry.insert(&WsConnection::new(Arc::clone(self.handler.connection()), tx));
        }
    }

    async fn event_loop(&mut self) {
        let mut idle_deadline = self.next_idle_deadline();
        loop {
            match self.next_event(idle_deadline).await {
                Event::Shutdown => {
                    debug!(
                        "shutdown requested: id={}",
                        self.handler.connection().session_id()
                    );
                    self.handler.on_transport_closed();
                    return;
                }
                Event::Inbound(None | Some(InboundEvent::Closed)) => {
                    self.handler.on_transport_closed();
                    return;
                }
                Event::Inbound(Some(InboundEvent::Frame(frame))) => {
                    idle_deadline = self.next_idle_deadline();
                    self.on_frame(frame);
                }
                Event::Inbound(Some(InboundEvent::Fault(fault))) => self.handler.on_fault(fault),
                Event::Inbound(Some(InboundEvent::Idle(state))) => self.handler.on_idle(state),
                Event::Command(Some(command)) => {
                    if matches!(command, Command::Send { .. } | Command::Close { .. }) {
                        idle_deadline = self.next_idle_deadline();
                    }
                    self.dispatch_command(command);
                }
                Event::Command(None) => self.commands_open = false,
                Event::IdleTimeout => {
                    self.handler.on_idle(IdleState::AllIdle);
                    idle_deadline = self.next_idle_deadline();
                }
            }
        }
    }

    fn next_idle_deadline(&self) -> Option<Instant> {
        self.idle_timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Await the next ready event using biased priority ordering.
    async fn next_event(&mut self, idle_deadline: Option<Instant>) -> Event {
        let idle = async move {
            match idle_deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => Event::Shutdown,
            event = self.events.recv() => Event::Inbound(event),
            command = self.commands.recv(), if self.commands_open => Event::Command(command),
            () = idle => Event::IdleTimeout,
        }
    }

    fn on_frame(&mut self, frame: RawFrame) {
        if let Err(e) = self.handler.on_frame(frame) {
            debug!(
                "routing frame error to fault path: id={}, error={e}",
                self.handler.connection().session_id()
            );
            self.handler.on_fault(TransportFault::CorruptedFrame(e));
        }
    }

    fn dispatch_command(&mut self, command: Command) {
        match command {
            Command::Send { frame, reply } => {
                let state = self.handler.state();
                let result = if state.close_phase() == ClosePhase::Idle {
                    Ok(state.write(frame))
                } else {
                    Err(ConnectionError::Closing)
                };
                let _ = reply.send(result);
            }
            Command::Close {
                code,
                reason,
                reply,
            } => {
                let _ = reply.send(self.handler.state_mut().begin_close(code, reason));
            }
            Command::CloseWriteFailed(error) => {
                debug!(
                    "close frame write failed: id={}, error={error}",
                    self.handler.connection().session_id()
                );
                self.handler.state_mut().fail_close(error);
            }
            Command::FinishClose {
                code,
                reason,
                reply,
            } => {
                let _ = reply.send(self.handler.finish_close(code, reason));
            }
        }
    }
}
