//! Utilities for driving a `wsgate` connection in memory during tests.
//!
//! [`SessionHarness`] spawns a [`ConnectionDriver`](wsgate::ConnectionDriver)
//! wired to a channel sink and a channel writer, so tests can feed frames in
//! and observe notifications and written frames without a socket.
//!
//! ```rust,no_run
//! use wsgate::{RawFrame, Role};
//! use wsgate_testing::SessionHarness;
//!
//! # async fn example() {
//! let mut session = SessionHarness::spawn(Role::Server);
//! session.frame(RawFrame::text("hi")).await;
//! let payload = session.next_payload().await;
//! # }
//! ```

pub mod harness;
pub mod logging;
mod macros;

pub use harness::{SessionHarness, client_session, drain_notifications, server_session};
pub use logging::{LoggerHandle, logger};
