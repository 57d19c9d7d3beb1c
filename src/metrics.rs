//! Metric helpers for `wsgate`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::frame::Opcode;

/// Name of the gauge tracking live WebSocket sessions.
pub const SESSIONS_ACTIVE: &str = "wsgate_sessions_active";
/// Name of the counter tracking classified inbound frames.
pub const FRAMES_RECEIVED: &str = "wsgate_frames_received_total";
/// Name of the counter tracking transport faults.
pub const FAULTS_TOTAL: &str = "wsgate_faults_total";
/// Name of the counter tracking synthesised abnormal closures.
pub const ABNORMAL_CLOSURES: &str = "wsgate_abnormal_closures_total";

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a classified inbound frame.
pub fn inc_frames(opcode: Opcode) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_RECEIVED, "kind" => opcode.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = opcode;
}

/// Record a transport fault of the given kind.
pub fn inc_faults(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(FAULTS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a synthesised abnormal closure.
pub fn inc_abnormal_closures() {
    #[cfg(feature = "metrics")]
    counter!(ABNORMAL_CLOSURES).increment(1);
}
