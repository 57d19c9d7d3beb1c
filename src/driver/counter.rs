//! Live session gauge.
//!
//! Each running driver holds an [`ActiveSession`] for its whole lifetime; the
//! process-wide count backs [`active_session_count`] and the `active=` field
//! of the session lifecycle logs.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::message::SessionId;

static ACTIVE_SESSIONS: AtomicU64 = AtomicU64::new(0);

/// Registration of one running session in the live gauge.
pub(super) struct ActiveSession {
    id: SessionId,
}

impl ActiveSession {
    /// Count `id` as live. Returns the guard and the count including it.
    pub(super) fn enter(id: SessionId) -> (Self, u64) {
        let active = ACTIVE_SESSIONS.fetch_add(1, Ordering::Relaxed) + 1;
        crate::metrics::inc_sessions();
        (Self { id }, active)
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        let remaining = ACTIVE_SESSIONS
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        crate::metrics::dec_sessions();
        debug!("session released: id={}, active={remaining}", self.id);
    }
}

/// Return the current number of live sessions.
#[must_use]
pub fn active_session_count() -> u64 { ACTIVE_SESSIONS.load(Ordering::Relaxed) }
