//! Close handshake coordination.
//!
//! A locally initiated close creates a [`PendingClose`] that resolves once the
//! peer echoes the close frame, or fails if the echo carries a different code
//! or never arrives. The resolving half is a `oneshot::Sender` held inside
//! [`CloseState::CloseSent`] and consumed by value on resolution, so a pending
//! close can only ever be settled once.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use log::debug;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::frame::{CloseCode, CloseFrame};

/// Failures of a close handshake.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CloseError {
    /// The peer echoed a different status code than the one sent.
    #[error(
        "expected status code {expected} but found {found} in echoed close frame from remote \
         endpoint"
    )]
    CloseCodeMismatch {
        /// Code this side sent.
        expected: CloseCode,
        /// Code the peer echoed.
        found: CloseCode,
    },
    /// The transport ended while the echo was outstanding.
    #[error("connection closed by remote endpoint without echoing a close frame")]
    CloseWithoutEcho,
    /// A close handshake was already started on this connection.
    #[error("close handshake already started")]
    AlreadyClosing,
    /// The peer started the close handshake; echo it instead of initiating.
    #[error("close frame already received from remote endpoint")]
    PeerInitiated,
    /// The code is reserved for local reporting and may not be sent.
    #[error("status code {code} may not be sent in a close frame")]
    UnsendableCode {
        /// Rejected code.
        code: CloseCode,
    },
    /// Writing the close frame failed.
    #[error("failed to write close frame: {0}")]
    Write(String),
    /// The connection was torn down before the handshake settled.
    #[error("connection dropped before the close handshake completed")]
    Dropped,
}

type CloseResult = Result<(), CloseError>;

/// Future resolving when a locally initiated close handshake settles.
#[derive(Debug)]
#[must_use = "a pending close reports whether the peer echoed the close frame"]
pub struct PendingClose {
    rx: oneshot::Receiver<CloseResult>,
}

impl PendingClose {
    fn channel() -> (oneshot::Sender<CloseResult>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A pending close that has already failed.
    pub(crate) fn failed(error: CloseError) -> Self {
        let (tx, pending) = Self::channel();
        let _ = tx.send(Err(error));
        pending
    }
}

impl Future for PendingClose {
    type Output = CloseResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(CloseError::Dropped)))
    }
}

/// Externally observable phase of the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClosePhase {
    /// No locally initiated close is outstanding.
    Idle,
    /// A close frame was sent and the echo is awaited.
    CloseSent,
    /// The pending close has been settled.
    Resolved,
}

#[derive(Debug)]
enum CloseState {
    Open { close_frame_received: bool },
    CloseSent {
        code: CloseCode,
        resolver: oneshot::Sender<CloseResult>,
    },
    Resolved,
}

/// What the state machine must do after a close frame from the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerClose {
    /// The peer initiated closure; deliver its close message.
    Initiated(CloseFrame),
    /// The echo matched and the pending close succeeded.
    Echoed,
    /// The echo carried another code and the pending close failed.
    Mismatched {
        /// Code this side sent.
        expected: CloseCode,
    },
    /// Nothing to do: duplicate or late close frame.
    Ignored,
}

/// What the state machine must do after the transport went away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportEnd {
    /// No close frame was ever exchanged.
    Abnormal,
    /// A pending close was failed with [`CloseError::CloseWithoutEcho`].
    EchoMissing,
    /// The handshake already accounted for the closure.
    Settled,
}

/// Per-connection close handshake state.
#[derive(Debug)]
pub struct CloseHandshake {
    state: CloseState,
    initiated_code: Option<CloseCode>,
}

impl Default for CloseHandshake {
    fn default() -> Self {
        Self {
            state: CloseState::Open {
                close_frame_received: false,
            },
            initiated_code: None,
        }
    }
}

impl CloseHandshake {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn phase(&self) -> ClosePhase {
        match self.state {
            CloseState::Open { .. } => ClosePhase::Idle,
            CloseState::CloseSent { .. } => ClosePhase::CloseSent,
            CloseState::Resolved => ClosePhase::Resolved,
        }
    }

    /// Status code this side sent, once a close has been initiated.
    #[must_use]
    pub fn close_initiated_code(&self) -> Option<CloseCode> { self.initiated_code }

    /// Whether the peer initiated closure.
    #[must_use]
    pub fn is_close_frame_received(&self) -> bool {
        matches!(
            self.state,
            CloseState::Open {
                close_frame_received: true
            }
        )
    }

    /// Start a locally initiated close with `code`.
    ///
    /// # Errors
    ///
    /// Returns [`CloseError::UnsendableCode`] for reserved codes,
    /// [`CloseError::PeerInitiated`] once the peer's close frame has been
    /// received, and [`CloseError::AlreadyClosing`] if a close was already
    /// initiated.
    pub fn begin(&mut self, code: CloseCode) -> Result<PendingClose, CloseError> {
        if !code.is_sendable() {
            return Err(CloseError::UnsendableCode { code });
        }
        match self.state {
            CloseState::Open {
                close_frame_received: false,
            } => {
                let (resolver, pending) = PendingClose::channel();
                self.state = CloseState::CloseSent { code, resolver };
                self.initiated_code = Some(code);
                Ok(pending)
            }
            CloseState::Open {
                close_frame_received: true,
            } => Err(CloseError::PeerInitiated),
            CloseState::CloseSent { .. } | CloseState::Resolved => Err(CloseError::AlreadyClosing),
        }
    }

    /// Apply a close frame received from the peer.
    pub fn on_peer_close(&mut self, frame: CloseFrame) -> PeerClose {
        match std::mem::replace(&mut self.state, CloseState::Resolved) {
            CloseState::Open {
                close_frame_received: false,
            } => {
                self.state = CloseState::Open {
                    close_frame_received: true,
                };
                PeerClose::Initiated(frame)
            }
            state @ CloseState::Open {
                close_frame_received: true,
            } => {
                self.state = state;
                PeerClose::Ignored
            }
            CloseState::CloseSent { code, resolver } if code == frame.code() => {
                Self::settle(resolver, Ok(()));
                PeerClose::Echoed
            }
            CloseState::CloseSent { code, resolver } => {
                Self::settle(
                    resolver,
                    Err(CloseError::CloseCodeMismatch {
                        expected: code,
                        found: frame.code(),
                    }),
                );
                PeerClose::Mismatched { expected: code }
            }
            CloseState::Resolved => PeerClose::Ignored,
        }
    }

    /// Apply the end of the transport.
    pub fn on_transport_closed(&mut self) -> TransportEnd {
        match std::mem::replace(&mut self.state, CloseState::Resolved) {
            CloseState::Open {
                close_frame_received,
            } => {
                self.state = CloseState::Open {
                    close_frame_received,
                };
                if close_frame_received {
                    TransportEnd::Settled
                } else {
                    TransportEnd::Abnormal
                }
            }
            CloseState::CloseSent { resolver, .. } => {
                Self::settle(resolver, Err(CloseError::CloseWithoutEcho));
                TransportEnd::EchoMissing
            }
            CloseState::Resolved => TransportEnd::Settled,
        }
    }

    /// Fail an outstanding close with `error`.
    ///
    /// Returns `false` when no close was pending.
    pub fn fail(&mut self, error: CloseError) -> bool {
        match std::mem::replace(&mut self.state, CloseState::Resolved) {
            CloseState::CloseSent { resolver, .. } => {
                Self::settle(resolver, Err(error));
                true
            }
            state => {
                self.state = state;
                false
            }
        }
    }

    fn settle(resolver: oneshot::Sender<CloseResult>, result: CloseResult) {
        if resolver.send(result).is_err() {
            debug!("pending close dropped before resolution was observed");
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn echo(code: u16) -> CloseFrame { CloseFrame::new(CloseCode::new(code), None) }

    #[tokio::test]
    async fn matching_echo_resolves_successfully() {
        let mut handshake = CloseHandshake::new();
        let pending = handshake.begin(CloseCode::NORMAL).expect("begin close");
        assert_eq!(handshake.phase(), ClosePhase::CloseSent);
        assert_eq!(handshake.on_peer_close(echo(1000)), PeerClose::Echoed);
        assert_eq!(handshake.phase(), ClosePhase::Resolved);
        assert_eq!(pending.await, Ok(()));
    }

    #[tokio::test]
    async fn mismatched_echo_names_both_codes() {
        let mut handshake = CloseHandshake::new();
        let pending = handshake.begin(CloseCode::NORMAL).expect("begin close");
        assert_eq!(
            handshake.on_peer_close(echo(1002)),
            PeerClose::Mismatched {
                expected: CloseCode::NORMAL
            }
        );
        let err = pending.await.unwrap_err();
        assert_eq!(
            err,
            CloseError::CloseCodeMismatch {
                expected: CloseCode::NORMAL,
                found: CloseCode::PROTOCOL_ERROR,
            }
        );
        let text = err.to_string();
        assert!(text.contains("1000") && text.contains("1002"), "{text}");
    }

    #[tokio::test]
    async fn transport_end_without_echo_fails_pending_close() {
        let mut handshake = CloseHandshake::new();
        let pending = handshake.begin(CloseCode::GOING_AWAY).expect("begin close");
        assert_eq!(handshake.on_transport_closed(), TransportEnd::EchoMissing);
        assert_eq!(pending.await, Err(CloseError::CloseWithoutEcho));
        assert_eq!(handshake.on_transport_closed(), TransportEnd::Settled);
    }

    #[test]
    fn peer_initiated_close_is_reported_once() {
        let mut handshake = CloseHandshake::new();
        assert_eq!(
            handshake.on_peer_close(echo(1001)),
            PeerClose::Initiated(echo(1001))
        );
        assert!(handshake.is_close_frame_received());
        assert_eq!(handshake.on_peer_close(echo(1001)), PeerClose::Ignored);
        assert_eq!(handshake.on_transport_closed(), TransportEnd::Settled);
        assert_eq!(handshake.phase(), ClosePhase::Idle);
    }

    #[test]
    fn transport_end_before_any_close_is_abnormal() {
        let mut handshake = CloseHandshake::new();
        assert_eq!(handshake.on_transport_closed(), TransportEnd::Abnormal);
    }

    #[test]
    fn second_initiation_is_rejected() {
        let mut handshake = CloseHandshake::new();
        let _pending = handshake.begin(CloseCode::NORMAL).expect("begin close");
        assert_eq!(
            handshake.begin(CloseCode::NORMAL).unwrap_err(),
            CloseError::AlreadyClosing
        );
        assert_eq!(handshake.close_initiated_code(), Some(CloseCode::NORMAL));
    }

    #[test]
    fn initiation_after_peer_close_is_rejected() {
        let mut handshake = CloseHandshake::new();
        let _ = handshake.on_peer_close(echo(1000));
        assert_eq!(
            handshake.begin(CloseCode::NORMAL).unwrap_err(),
            CloseError::PeerInitiated
        );
    }

    #[rstest]
    #[case(CloseCode::NO_STATUS_RECEIVED)]
    #[case(CloseCode::ABNORMAL_CLOSURE)]
    fn reserved_codes_cannot_start_a_close(#[case] code: CloseCode) {
        let mut handshake = CloseHandshake::new();
        assert_eq!(
            handshake.begin(code).unwrap_err(),
            CloseError::UnsendableCode { code }
        );
        assert_eq!(handshake.phase(), ClosePhase::Idle);
    }

    #[tokio::test]
    async fn write_failure_settles_pending_close_once() {
        let mut handshake = CloseHandshake::new();
        let pending = handshake.begin(CloseCode::NORMAL).expect("begin close");
        assert!(handshake.fail(CloseError::Write("broken pipe".into())));
        assert!(!handshake.fail(CloseError::Write("again".into())));
        assert_eq!(handshake.on_peer_close(echo(1000)), PeerClose::Ignored);
        assert_eq!(
            pending.await,
            Err(CloseError::Write("broken pipe".into()))
        );
    }

    #[tokio::test]
    async fn dropped_resolver_reports_dropped() {
        let mut handshake = CloseHandshake::new();
        let pending = handshake.begin(CloseCode::NORMAL).expect("begin close");
        drop(handshake);
        assert_eq!(pending.await, Err(CloseError::Dropped));
    }
}
