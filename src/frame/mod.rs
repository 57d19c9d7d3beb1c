//! Inbound frame model and classification.
//!
//! The framing layer hands the connection core a [`RawFrame`] per decoded
//! wire frame. [`classify`] turns it into an [`InboundFrame`], the tagged
//! variant the rest of the core dispatches on. Byte-level sequencing rules are
//! owned by the framing layer; classification only decides what kind of frame
//! it has been given.

pub mod close;
mod error;

use bytes::Bytes;
pub use close::{CloseCode, CloseFrame};
pub use error::FrameError;

/// WebSocket opcodes understood by the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation of a fragmented text or binary message.
    Continuation,
    /// UTF-8 text data.
    Text,
    /// Arbitrary binary data.
    Binary,
    /// Close handshake frame.
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
}

impl Opcode {
    /// Wire value of the opcode.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Short lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            opcode => Err(FrameError::UnrecognizedFrameKind { opcode }),
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// A frame exactly as the framing layer decoded it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    opcode: u8,
    fin: bool,
    payload: Bytes,
}

impl RawFrame {
    /// Construct a frame from its wire opcode, final-fragment flag and payload.
    #[must_use]
    pub fn new(opcode: u8, fin: bool, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            fin,
            payload: payload.into(),
        }
    }

    /// A final text frame.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text.as_u8(), true, Bytes::from(text.into()))
    }

    /// A final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self { Self::new(Opcode::Binary.as_u8(), true, data) }

    /// A continuation frame.
    #[must_use]
    pub fn continuation(fin: bool, data: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Continuation.as_u8(), fin, data)
    }

    /// A close frame carrying `frame` as its payload.
    #[must_use]
    pub fn close(frame: &CloseFrame) -> Self { Self::new(Opcode::Close.as_u8(), true, frame.encode()) }

    /// A ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self { Self::new(Opcode::Ping.as_u8(), true, data) }

    /// A pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self { Self::new(Opcode::Pong.as_u8(), true, data) }

    /// Return a copy of the frame with the final-fragment flag replaced.
    #[must_use]
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Raw opcode value.
    #[must_use]
    pub const fn opcode(&self) -> u8 { self.opcode }

    /// Whether the frame completes its message.
    #[must_use]
    pub const fn is_final(&self) -> bool { self.fin }

    /// Borrow the payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }
}

/// Semantic kind of an inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// Text data, still UTF-8 encoded; fragments may split code points.
    Text { payload: Bytes, final_fragment: bool },
    /// Binary data.
    Binary { payload: Bytes, final_fragment: bool },
    /// A decoded close frame.
    Close(CloseFrame),
    /// Ping with its application data.
    Ping(Bytes),
    /// Pong with its application data.
    Pong(Bytes),
    /// Continuation whose kind is inherited from the open fragmented message.
    Continuation { payload: Bytes, final_fragment: bool },
}

impl InboundFrame {
    /// Opcode the frame was classified from.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Text { .. } => Opcode::Text,
            Self::Binary { .. } => Opcode::Binary,
            Self::Close(_) => Opcode::Close,
            Self::Ping(_) => Opcode::Ping,
            Self::Pong(_) => Opcode::Pong,
            Self::Continuation { .. } => Opcode::Continuation,
        }
    }
}

/// Determine the semantic kind of `frame`.
///
/// Close payloads are decoded here so malformed close frames are rejected
/// before they reach the close handshake.
///
/// # Errors
///
/// Returns [`FrameError::UnrecognizedFrameKind`] for opcodes outside the set
/// the core understands, and [`FrameError::MalformedClosePayload`] or
/// [`FrameError::InvalidCloseReason`] for undecodable close frames.
pub fn classify(frame: RawFrame) -> Result<InboundFrame, FrameError> {
    let RawFrame {
        opcode,
        fin,
        payload,
    } = frame;
    let frame = match Opcode::try_from(opcode)? {
        Opcode::Text => InboundFrame::Text {
            payload,
            final_fragment: fin,
        },
        Opcode::Binary => InboundFrame::Binary {
            payload,
            final_fragment: fin,
        },
        Opcode::Continuation => InboundFrame::Continuation {
            payload,
            final_fragment: fin,
        },
        Opcode::Close => InboundFrame::Close(CloseFrame::decode(&payload)?),
        Opcode::Ping => InboundFrame::Ping(payload),
        Opcode::Pong => InboundFrame::Pong(payload),
    };
    Ok(frame)
}
