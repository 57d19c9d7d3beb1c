//! Process-wide live session counting.

use serial_test::serial;
use wsgate::{Role, active_session_count};
use wsgate_testing::SessionHarness;

#[tokio::test]
#[serial]
async fn active_sessions_are_counted() {
    let before = active_session_count();
    let first = SessionHarness::spawn(Role::Server);
    let second = SessionHarness::spawn(Role::Client);
    first.conn.ping("sync").await.expect("driver alive");
    second.conn.ping("sync").await.expect("driver alive");
    assert_eq!(active_session_count(), before + 2);

    first.close_transport().await;
    assert_eq!(active_session_count(), before + 1);
    second.close_transport().await;
    assert_eq!(active_session_count(), before);
}

#[tokio::test]
#[serial]
async fn shutdown_releases_session() {
    let before = active_session_count();
    let session = SessionHarness::spawn(Role::Server);
    session.conn.ping("sync").await.expect("driver alive");
    assert_eq!(active_session_count(), before + 1);

    session.shutdown.cancel();
    let remaining = session.close_transport().await;
    assert_eq!(remaining.len(), 1, "abnormal closure on shutdown");
    assert_eq!(active_session_count(), before);
}
