//! Close frame payload: a 2-byte big-endian status code followed by an
//! optional UTF-8 reason.

use bytes::{BufMut, Bytes, BytesMut};

use super::FrameError;

/// WebSocket close status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CloseCode(u16);

impl CloseCode {
    /// The purpose of the connection has been fulfilled.
    pub const NORMAL: Self = Self(1000);
    /// The endpoint is going away.
    pub const GOING_AWAY: Self = Self(1001);
    /// Protocol error.
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// Received data the endpoint cannot accept.
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    /// Reserved: the close frame carried no status code.
    pub const NO_STATUS_RECEIVED: Self = Self(1005);
    /// Reserved: the transport ended without a close frame exchange.
    pub const ABNORMAL_CLOSURE: Self = Self(1006);
    /// Message data inconsistent with its type.
    pub const INVALID_PAYLOAD: Self = Self(1007);
    /// Generic policy violation.
    pub const POLICY_VIOLATION: Self = Self(1008);
    /// Message too big to process.
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    /// Client expected an extension the server did not negotiate.
    pub const MANDATORY_EXTENSION: Self = Self(1010);
    /// The endpoint encountered an unexpected condition.
    pub const UNEXPECTED_CONDITION: Self = Self(1011);
    /// Reserved: TLS handshake failure.
    pub const TLS_HANDSHAKE: Self = Self(1015);

    /// Wrap a raw status code.
    #[must_use]
    pub const fn new(code: u16) -> Self { Self(code) }

    /// Raw status code.
    #[must_use]
    pub const fn as_u16(self) -> u16 { self.0 }

    /// Whether the code may appear on the wire.
    ///
    /// 1005, 1006 and 1015 are reserved for local reporting only.
    #[must_use]
    pub const fn is_sendable(self) -> bool {
        matches!(self.0, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self { Self(value) }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self { code.0 }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// Decoded close frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    code: CloseCode,
    reason: Option<String>,
}

impl CloseFrame {
    /// Construct a close frame with an optional reason.
    #[must_use]
    pub fn new(code: CloseCode, reason: Option<String>) -> Self { Self { code, reason } }

    /// Status code carried by the frame.
    #[must_use]
    pub const fn code(&self) -> CloseCode { self.code }

    /// Reason text, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> { self.reason.as_deref() }

    /// Consume the frame, returning its code and reason.
    #[must_use]
    pub fn into_parts(self) -> (CloseCode, Option<String>) { (self.code, self.reason) }

    /// Decode a close payload.
    ///
    /// An empty payload reports [`CloseCode::NO_STATUS_RECEIVED`]. An empty
    /// reason is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::MalformedClosePayload`] for a 1-byte payload and
    /// [`FrameError::InvalidCloseReason`] if the reason is not UTF-8.
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        match payload {
            [] => Ok(Self::new(CloseCode::NO_STATUS_RECEIVED, None)),
            [_] => Err(FrameError::MalformedClosePayload { len: 1 }),
            [hi, lo, reason @ ..] => {
                let code = CloseCode(u16::from_be_bytes([*hi, *lo]));
                let reason = std::str::from_utf8(reason)
                    .map_err(|_| FrameError::InvalidCloseReason)?;
                let reason = (!reason.is_empty()).then(|| reason.to_owned());
                Ok(Self::new(code, reason))
            }
        }
    }

    /// Encode the frame into its wire payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let reason = self.reason().unwrap_or_default();
        let mut buf = BytesMut::with_capacity(2 + reason.len());
        buf.put_u16(self.code.as_u16());
        buf.put_slice(reason.as_bytes());
        buf.freeze()
    }
}
