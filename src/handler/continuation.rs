//! Routing of continuation frames to the message kind they extend.

use crate::frame::FrameError;

/// Data kind of an in-flight fragmented message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentKind {
    Text,
    Binary,
}

/// Remembers which kind of message the open fragment sequence belongs to.
///
/// Text fragments may split a UTF-8 code point across frames, so the tracker
/// also carries up to three trailing bytes forward into the next fragment.
#[derive(Debug, Default)]
pub struct ContinuationTracker {
    fragment_kind: Option<FragmentKind>,
    carry: Vec<u8>,
}

impl ContinuationTracker {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Kind of the fragmented message currently open, if any.
    #[must_use]
    pub fn fragment_kind(&self) -> Option<FragmentKind> { self.fragment_kind }

    /// Record a text or binary data frame.
    ///
    /// A non-final frame opens a fragmented message of `kind`; a final frame
    /// leaves no message open.
    pub fn start(&mut self, kind: FragmentKind, final_fragment: bool) {
        self.carry.clear();
        self.fragment_kind = (!final_fragment).then_some(kind);
    }

    /// Resolve the kind a continuation frame inherits.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::OrphanContinuation`] when no fragmented message
    /// is open.
    pub fn resume(&mut self, final_fragment: bool) -> Result<FragmentKind, FrameError> {
        let kind = self.fragment_kind.ok_or(FrameError::OrphanContinuation)?;
        if final_fragment {
            self.fragment_kind = None;
        }
        Ok(kind)
    }

    /// Decode the longest complete UTF-8 prefix of the pending bytes plus
    /// `payload`, keeping an incomplete trailing code point for the next
    /// fragment.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidUtf8`] for invalid sequences, or when the
    /// final fragment ends inside a code point.
    pub fn decode_text(&mut self, payload: &[u8], final_fragment: bool) -> Result<String, FrameError> {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(payload);
        let complete = match std::str::from_utf8(&bytes) {
            Ok(_) => bytes.len(),
            Err(e) if e.error_len().is_none() && !final_fragment => e.valid_up_to(),
            Err(_) => return Err(FrameError::InvalidUtf8),
        };
        self.carry = bytes.split_off(complete);
        String::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn non_final_frame_opens_fragment() {
        let mut tracker = ContinuationTracker::new();
        tracker.start(FragmentKind::Binary, false);
        assert_eq!(tracker.fragment_kind(), Some(FragmentKind::Binary));
        assert_eq!(tracker.resume(false), Ok(FragmentKind::Binary));
        assert_eq!(tracker.resume(true), Ok(FragmentKind::Binary));
        assert_eq!(tracker.fragment_kind(), None);
    }

    #[test]
    fn final_frame_leaves_nothing_open() {
        let mut tracker = ContinuationTracker::new();
        tracker.start(FragmentKind::Text, true);
        assert_eq!(tracker.resume(true), Err(FrameError::OrphanContinuation));
    }

    #[test]
    fn new_message_restarts_tracking() {
        let mut tracker = ContinuationTracker::new();
        tracker.start(FragmentKind::Text, false);
        tracker.start(FragmentKind::Binary, false);
        assert_eq!(tracker.resume(true), Ok(FragmentKind::Binary));
    }

    #[test]
    fn carries_split_code_point() {
        let mut tracker = ContinuationTracker::new();
        let snowman = "☃".as_bytes();
        assert_eq!(
            tracker
                .decode_text(&[b'a', snowman[0]], false)
                .expect("first fragment"),
            "a"
        );
        assert_eq!(
            tracker.decode_text(&snowman[1..], true).expect("last fragment"),
            "☃"
        );
    }

    #[rstest]
    #[case(&[0xFF], false)]
    #[case(&[b'o', b'k', 0xE2, 0x98], true)]
    fn rejects_invalid_text(#[case] payload: &[u8], #[case] final_fragment: bool) {
        let mut tracker = ContinuationTracker::new();
        assert_eq!(
            tracker.decode_text(payload, final_fragment),
            Err(FrameError::InvalidUtf8)
        );
    }
}
