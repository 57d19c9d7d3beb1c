//! Per-connection inbound frame state machine.
//!
//! [`FrameStateMachine`] is the shared component: it classifies frames,
//! routes continuations, drives the close handshake and turns faults into
//! notifications. [`ServerFrameHandler`] and [`ClientFrameHandler`] compose it
//! behind the [`InboundFrameHandler`] trait and differ only in who closes the
//! transport once a close handshake has completed.
//!
//! All methods expect to be called from the connection's single serialized
//! context, in receive order.

mod assembler;
pub mod close;
mod continuation;
mod fault;

use std::sync::Arc;

pub use assembler::MessageAssembler;
use bytes::Bytes;
pub use close::{CloseError, ClosePhase, PendingClose};
use close::{CloseHandshake, PeerClose, TransportEnd};
pub use continuation::{ContinuationTracker, FragmentKind};
pub use fault::{IdleState, TransportFault};
use log::{debug, info, warn};
use tokio_util::task::TaskTracker;

use crate::{
    frame::{CloseCode, CloseFrame, FrameError, InboundFrame, RawFrame, classify},
    message::{ConnectionInfo, ControlSignal, Role},
    sink::MessageSink,
    transport::{FrameWriter, OutboundFrame, WriteFuture},
};

/// Reason sent with the close frame written after a corrupted frame.
pub const UNEXPECTED_CONDITION_REASON: &str = "Encountered an unexpected condition";

/// Result of processing one inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing further for the caller to do.
    Continue,
    /// The peer's echo settled a close this side initiated.
    HandshakeComplete,
}

/// Shared inbound state of one connection.
pub struct FrameStateMachine {
    assembler: MessageAssembler,
    continuation: ContinuationTracker,
    close: CloseHandshake,
    caught_fault: bool,
    sink: Arc<dyn MessageSink>,
    writer: Arc<dyn FrameWriter>,
    tasks: TaskTracker,
}

impl FrameStateMachine {
    /// Create the state machine for `connection`.
    #[must_use]
    pub fn new(
        connection: Arc<ConnectionInfo>,
        sink: Arc<dyn MessageSink>,
        writer: Arc<dyn FrameWriter>,
    ) -> Self {
        Self {
            assembler: MessageAssembler::new(connection),
            continuation: ContinuationTracker::new(),
            close: CloseHandshake::new(),
            caught_fault: false,
            sink,
            writer,
            tasks: TaskTracker::new(),
        }
    }

    /// Run write continuations on `tasks` instead of a private tracker.
    #[must_use]
    pub fn with_task_tracker(mut self, tasks: TaskTracker) -> Self {
        self.tasks = tasks;
        self
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionInfo> { self.assembler.connection() }

    /// Tracker owning write continuations spawned by this state machine.
    #[must_use]
    pub fn tasks(&self) -> &TaskTracker { &self.tasks }

    #[must_use]
    pub fn close_phase(&self) -> ClosePhase { self.close.phase() }

    /// Status code of the close this side initiated, if any.
    #[must_use]
    pub fn close_initiated_code(&self) -> Option<CloseCode> { self.close.close_initiated_code() }

    /// Whether the peer initiated the close handshake.
    #[must_use]
    pub fn is_close_frame_received(&self) -> bool { self.close.is_close_frame_received() }

    /// Whether a transport fault has been observed.
    #[must_use]
    pub fn has_caught_fault(&self) -> bool { self.caught_fault }

    /// Kind of the fragmented message currently open.
    #[must_use]
    pub fn fragment_kind(&self) -> Option<FragmentKind> { self.continuation.fragment_kind() }

    /// Classify `frame` and deliver whatever it completes.
    ///
    /// Once a fault has been caught no further frames are delivered; only a
    /// close frame settling a pending close is still applied.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the frame cannot be interpreted. Nothing
    /// is delivered for that frame.
    pub fn on_frame(&mut self, frame: RawFrame) -> Result<FrameOutcome, FrameError> {
        if self.caught_fault {
            return Ok(self.on_frame_after_fault(frame));
        }
        let frame = classify(frame)?;
        crate::metrics::inc_frames(frame.opcode());
        match frame {
            InboundFrame::Text {
                payload,
                final_fragment,
            } => {
                self.continuation.start(FragmentKind::Text, final_fragment);
                self.deliver_text(&payload, final_fragment)?;
            }
            InboundFrame::Binary {
                payload,
                final_fragment,
            } => {
                self.continuation.start(FragmentKind::Binary, final_fragment);
                self.deliver_binary(payload, final_fragment);
            }
            InboundFrame::Continuation {
                payload,
                final_fragment,
            } => match self.continuation.resume(final_fragment)? {
                FragmentKind::Text => self.deliver_text(&payload, final_fragment)?,
                FragmentKind::Binary => self.deliver_binary(payload, final_fragment),
            },
            InboundFrame::Close(frame) => return Ok(self.on_close_frame(frame)),
            InboundFrame::Ping(data) => self.deliver_control(ControlSignal::Ping, data),
            InboundFrame::Pong(data) => self.deliver_control(ControlSignal::Pong, data),
        }
        Ok(FrameOutcome::Continue)
    }

    fn on_frame_after_fault(&mut self, frame: RawFrame) -> FrameOutcome {
        let id = self.connection().session_id();
        let opcode = frame.opcode();
        if self.close.phase() == ClosePhase::CloseSent
            && let Ok(InboundFrame::Close(close)) = classify(frame)
        {
            return self.on_close_frame(close);
        }
        debug!("dropping frame on faulted connection: id={id}, opcode={opcode:#x}");
        FrameOutcome::Continue
    }

    fn deliver_text(&mut self, payload: &[u8], final_fragment: bool) -> Result<(), FrameError> {
        let text = self.continuation.decode_text(payload, final_fragment)?;
        self.sink.deliver(self.assembler.text(text, final_fragment));
        Ok(())
    }

    fn deliver_binary(&self, data: Bytes, final_fragment: bool) {
        self.sink.deliver(self.assembler.binary(data, final_fragment));
    }

    fn deliver_control(&self, signal: ControlSignal, data: Bytes) {
        self.sink.deliver(self.assembler.control(signal, Some(data)));
    }

    fn on_close_frame(&mut self, frame: CloseFrame) -> FrameOutcome {
        let id = self.connection().session_id();
        let code = frame.code();
        match self.close.on_peer_close(frame) {
            PeerClose::Initiated(frame) => {
                info!("close frame received from peer: id={id}, code={code}");
                let (code, reason) = frame.into_parts();
                self.sink.deliver(self.assembler.close(code, reason));
                FrameOutcome::Continue
            }
            PeerClose::Echoed => {
                debug!("close handshake completed: id={id}, code={code}");
                FrameOutcome::HandshakeComplete
            }
            PeerClose::Mismatched { expected } => {
                warn!("close echo mismatch: id={id}, expected={expected}, found={code}");
                FrameOutcome::HandshakeComplete
            }
            PeerClose::Ignored => {
                debug!("ignoring close frame after handshake settled: id={id}, code={code}");
                FrameOutcome::Continue
            }
        }
    }

    /// Handle the end of the underlying transport.
    pub fn on_transport_closed(&mut self) {
        let id = self.connection().session_id();
        match self.close.on_transport_closed() {
            TransportEnd::Abnormal if self.caught_fault => {
                debug!("transport closed after fault, abnormal closure already reported: id={id}");
            }
            TransportEnd::Abnormal => {
                info!("transport closed without close handshake: id={id}");
                crate::metrics::inc_abnormal_closures();
                self.sink.deliver(self.assembler.abnormal_closure());
            }
            TransportEnd::EchoMissing => {
                warn!("transport closed while awaiting close echo: id={id}");
            }
            TransportEnd::Settled => debug!("transport closed: id={id}"),
        }
    }

    /// Handle a transport fault.
    ///
    /// For a corrupted frame a close frame is written first; once that write
    /// settles the transport is closed and only then is the fault delivered.
    /// Other faults are delivered immediately. Only the first fault of a
    /// connection is delivered.
    pub fn on_fault(&mut self, fault: TransportFault) {
        let connection = Arc::clone(self.connection());
        let id = connection.session_id();
        if self.caught_fault {
            warn!("dropping fault on already faulted connection: id={id}, fault={fault}");
            return;
        }
        self.caught_fault = true;
        crate::metrics::inc_faults(fault.kind());
        warn!("transport fault: id={id}, kind={}, error={fault}", fault.kind());

        if !fault.is_recoverable() {
            self.sink.deliver_fault(connection, fault);
            return;
        }

        let write = self.writer.write_frame(OutboundFrame::Close(CloseFrame::new(
            CloseCode::UNEXPECTED_CONDITION,
            Some(UNEXPECTED_CONDITION_REASON.to_owned()),
        )));
        let writer = Arc::clone(&self.writer);
        let sink = Arc::clone(&self.sink);
        self.tasks.spawn(async move {
            if let Err(e) = write.await {
                debug!("close frame after fault not written: id={id}, error={e}");
            }
            if let Err(e) = writer.close().await {
                debug!("closing transport after fault failed: id={id}, error={e}");
            }
            sink.deliver_fault(connection, fault);
        });
    }

    /// Handle an idle signal. Only [`IdleState::AllIdle`] is reported.
    pub fn on_idle(&mut self, idle: IdleState) {
        if idle == IdleState::AllIdle {
            debug!("connection idle: id={}", self.connection().session_id());
            self.sink
                .deliver_idle_timeout(self.assembler.control(ControlSignal::IdleTimeout, None));
        }
    }

    /// Initiate a close handshake with `code`.
    ///
    /// Returns the pending close and the write of the close frame. The caller
    /// drives the write and reports failure through [`Self::fail_close`].
    ///
    /// # Errors
    ///
    /// Returns a [`CloseError`] if the handshake cannot be started.
    pub fn begin_close(
        &mut self,
        code: CloseCode,
        reason: Option<String>,
    ) -> Result<(PendingClose, WriteFuture), CloseError> {
        let pending = self.close.begin(code)?;
        info!(
            "initiating close: id={}, code={code}",
            self.connection().session_id()
        );
        let write = self
            .writer
            .write_frame(OutboundFrame::Close(CloseFrame::new(code, reason)));
        Ok((pending, write))
    }

    /// Write an application frame.
    pub fn write(&self, frame: OutboundFrame) -> WriteFuture { self.writer.write_frame(frame) }

    /// Fail an outstanding close. Returns `false` if none was pending.
    pub fn fail_close(&mut self, error: CloseError) -> bool { self.close.fail(error) }

    /// Write a close frame echoing the peer's close.
    pub fn echo_close(&self, code: CloseCode, reason: Option<String>) -> WriteFuture {
        self.writer
            .write_frame(OutboundFrame::Close(CloseFrame::new(code, reason)))
    }

    /// Write a close frame echoing the peer's close, then close the transport.
    pub fn finish_close(&self, code: CloseCode, reason: Option<String>) -> WriteFuture {
        let write = self.echo_close(code, reason);
        let writer = Arc::clone(&self.writer);
        Box::pin(async move {
            write.await?;
            writer.close().await
        })
    }

    /// Close the transport from a spawned continuation.
    fn close_transport(&self) {
        let writer = Arc::clone(&self.writer);
        let id = self.connection().session_id();
        self.tasks.spawn(async move {
            if let Err(e) = writer.close().await {
                debug!("closing transport failed: id={id}, error={e}");
            }
        });
    }
}

/// Inbound event contract implemented per connection role.
pub trait InboundFrameHandler: Send + 'static {
    /// Role this handler plays.
    fn role(&self) -> Role;

    fn state(&self) -> &FrameStateMachine;

    fn state_mut(&mut self) -> &mut FrameStateMachine;

    /// Role-specific step once a locally initiated handshake completed.
    fn on_handshake_complete(&mut self);

    /// Echo a close frame the peer initiated, then take the role-specific
    /// step towards ending the transport.
    fn finish_close(&mut self, code: CloseCode, reason: Option<String>) -> WriteFuture;

    /// Process one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the frame cannot be interpreted.
    fn on_frame(&mut self, frame: RawFrame) -> Result<(), FrameError> {
        if self.state_mut().on_frame(frame)? == FrameOutcome::HandshakeComplete {
            self.on_handshake_complete();
        }
        Ok(())
    }

    fn on_transport_closed(&mut self) { self.state_mut().on_transport_closed(); }

    fn on_fault(&mut self, fault: TransportFault) { self.state_mut().on_fault(fault); }

    fn on_idle(&mut self, idle: IdleState) { self.state_mut().on_idle(idle); }

    fn connection(&self) -> &Arc<ConnectionInfo> { self.state().connection() }
}

/// Handler for connections accepted by a listener.
///
/// After a close handshake completes, whichever side initiated it, the
/// server closes the transport itself.
pub struct ServerFrameHandler {
    state: FrameStateMachine,
}

impl ServerFrameHandler {
    #[must_use]
    pub fn new(state: FrameStateMachine) -> Self { Self { state } }
}

impl InboundFrameHandler for ServerFrameHandler {
    fn role(&self) -> Role { Role::Server }

    fn state(&self) -> &FrameStateMachine { &self.state }

    fn state_mut(&mut self) -> &mut FrameStateMachine { &mut self.state }

    fn on_handshake_complete(&mut self) {
        debug!(
            "server closing transport after handshake: id={}",
            self.state.connection().session_id()
        );
        self.state.close_transport();
    }

    fn finish_close(&mut self, code: CloseCode, reason: Option<String>) -> WriteFuture {
        self.state.finish_close(code, reason)
    }
}

/// Handler for connections this side dialled.
///
/// After a close handshake completes the client leaves the transport open
/// and waits for the server to close it.
pub struct ClientFrameHandler {
    state: FrameStateMachine,
}

impl ClientFrameHandler {
    #[must_use]
    pub fn new(state: FrameStateMachine) -> Self { Self { state } }
}

impl InboundFrameHandler for ClientFrameHandler {
    fn role(&self) -> Role { Role::Client }

    fn state(&self) -> &FrameStateMachine { &self.state }

    fn state_mut(&mut self) -> &mut FrameStateMachine { &mut self.state }

    fn on_handshake_complete(&mut self) {
        debug!(
            "client awaiting server transport close: id={}",
            self.state.connection().session_id()
        );
    }

    fn finish_close(&mut self, code: CloseCode, reason: Option<String>) -> WriteFuture {
        debug!(
            "client echoing close, awaiting server transport close: id={}",
            self.state.connection().session_id()
        );
        self.state.echo_close(code, reason)
    }
}

/// Build the handler matching the role recorded in `state`'s connection.
#[must_use]
pub fn handler_for(state: FrameStateMachine) -> Box<dyn InboundFrameHandler> {
    match state.connection().role() {
        Role::Server => Box::new(ServerFrameHandler::new(state)),
        Role::Client => Box::new(ClientFrameHandler::new(state)),
    }
}

impl<H: InboundFrameHandler + ?Sized> InboundFrameHandler for Box<H> {
    fn role(&self) -> Role { (**self).role() }

    fn state(&self) -> &FrameStateMachine { (**self).state() }

    fn state_mut(&mut self) -> &mut FrameStateMachine { (**self).state_mut() }

    fn on_handshake_complete(&mut self) { (**self).on_handshake_complete(); }

    fn finish_close(&mut self, code: CloseCode, reason: Option<String>) -> WriteFuture {
        (**self).finish_close(code, reason)
    }

    fn on_frame(&mut self, frame: RawFrame) -> Result<(), FrameError> { (**self).on_frame(frame) }

    fn on_transport_closed(&mut self) { (**self).on_transport_closed(); }

    fn on_fault(&mut self, fault: TransportFault) { (**self).on_fault(fault); }

    fn on_idle(&mut self, idle: IdleState) { (**self).on_idle(idle); }
}
