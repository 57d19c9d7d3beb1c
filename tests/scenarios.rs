//! End-to-end connection scenarios driven through the in-memory harness.

use std::{io, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::stream;
use http::{Request, Response, StatusCode};
use rstest::rstest;
use tokio::sync::mpsc;
use wsgate::{
    CloseCode,
    CloseError,
    CloseFrame,
    ConnectionConfig,
    ControlSignal,
    FrameError,
    Notification,
    OutboundFrame,
    Payload,
    PipelineConfig,
    RawFrame,
    Role,
    TransportFault,
    http::{RequestHandler, serve_pipelined},
};
use wsgate_testing::{SessionHarness, assert_payload, client_session, server_session};

fn close(code: u16) -> RawFrame { RawFrame::close(&CloseFrame::new(CloseCode::new(code), None)) }

/// Answers `200 OK` after sleeping for the number of milliseconds in the body.
struct SlowOk;

#[async_trait::async_trait]
impl RequestHandler for SlowOk {
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let delay = std::str::from_utf8(request.body())
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Response::builder()
            .status(StatusCode::OK)
            .body(Bytes::copy_from_slice(request.uri().path().as_bytes()))
            .expect("build response")
    }
}

#[tokio::test(start_paused = true)]
async fn pipelined_requests_answered_in_order() {
    let (tx, mut rx) = mpsc::channel(2);
    let requests = stream::iter([
        Request::get("/one").body(Bytes::from_static(b"40")).expect("request"),
        Request::get("/two").body(Bytes::from_static(b"1")).expect("request"),
    ]);
    serve_pipelined(requests, Arc::new(SlowOk), tx, &PipelineConfig::default())
        .await
        .expect("serve");

    for expected in ["/one", "/two"] {
        let response = rx.recv().await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), expected.as_bytes());
    }
}

#[rstest]
#[tokio::test]
async fn matching_echo_resolves_close(
    #[values(Role::Server, Role::Client)] role: Role,
) {
    let mut session = SessionHarness::spawn(role);
    let pending = session
        .conn
        .begin_close(CloseCode::NORMAL, None)
        .await
        .expect("close started");
    assert!(matches!(
        session.next_outbound().await,
        OutboundFrame::Close(frame) if frame.code() == CloseCode::NORMAL
    ));
    session.frame(close(1000)).await;
    assert_eq!(pending.await, Ok(()));

    let remaining = session.close_transport().await;
    assert!(remaining.is_empty(), "clean close delivers nothing: {remaining:?}");
}

#[rstest]
#[case(1001)]
#[case(1002)]
#[tokio::test]
async fn mismatched_echo_fails_with_both_codes(mut server_session: SessionHarness, #[case] echoed: u16) {
    let pending = server_session
        .conn
        .begin_close(CloseCode::NORMAL, None)
        .await
        .expect("close started");
    server_session.next_outbound().await;
    server_session.frame(close(echoed)).await;

    let err = pending.await.expect_err("mismatch");
    assert_eq!(
        err,
        CloseError::CloseCodeMismatch {
            expected: CloseCode::NORMAL,
            found: CloseCode::new(echoed),
        }
    );
    let text = err.to_string();
    assert!(text.contains("1000") && text.contains(&echoed.to_string()));
}

#[rstest]
#[tokio::test]
async fn transport_end_without_close_is_abnormal(mut client_session: SessionHarness) {
    client_session.frame(RawFrame::binary(vec![1, 2, 3])).await;
    assert_eq!(
        client_session.next_payload().await,
        Payload::Binary {
            data: Bytes::from_static(&[1, 2, 3]),
            final_fragment: true,
        }
    );

    let remaining = client_session.close_transport().await;
    assert_eq!(remaining.len(), 1);
    assert_payload!(
        &remaining[0],
        Payload::Close { code, reason: None } if *code == CloseCode::ABNORMAL_CLOSURE
    );
}

#[rstest]
#[tokio::test]
async fn corrupted_frame_fault_reported_exactly_once(mut server_session: SessionHarness) {
    server_session
        .fault(TransportFault::CorruptedFrame(FrameError::InvalidUtf8))
        .await;
    server_session
        .fault(TransportFault::Io(io::Error::other("late")))
        .await;

    assert!(matches!(
        server_session.next_outbound().await,
        OutboundFrame::Close(frame) if frame.code() == CloseCode::UNEXPECTED_CONDITION
    ));
    let remaining = server_session.close_transport().await;
    let faults: Vec<_> = remaining.iter().filter(|n| n.is_fault()).collect();
    assert_eq!(faults.len(), 1, "{remaining:?}");
    assert!(matches!(
        faults[0],
        Notification::Fault {
            fault: TransportFault::CorruptedFrame(FrameError::InvalidUtf8),
            ..
        }
    ));
    assert_eq!(remaining.len(), 1, "no abnormal closure after a fault");
}

#[rstest]
#[tokio::test]
async fn frames_after_fault_are_not_delivered(mut server_session: SessionHarness) {
    server_session
        .fault(TransportFault::CorruptedFrame(FrameError::InvalidUtf8))
        .await;
    server_session.frame(close(1011)).await;
    server_session.frame(RawFrame::text("after fault")).await;

    assert!(matches!(
        server_session.next_outbound().await,
        OutboundFrame::Close(frame) if frame.code() == CloseCode::UNEXPECTED_CONDITION
    ));
    let remaining = server_session.close_transport().await;
    assert_eq!(remaining.len(), 1, "only the fault is delivered: {remaining:?}");
    assert!(remaining[0].is_fault());
}

#[rstest]
#[case(Role::Server, true)]
#[case(Role::Client, false)]
#[tokio::test]
async fn peer_close_echo_leaves_transport_to_server(#[case] role: Role, #[case] closes: bool) {
    let mut session = SessionHarness::spawn(role);
    session.frame(close(1001)).await;
    assert_payload!(
        &session.next_notification().await,
        Payload::Close { code, reason: None } if *code == CloseCode::GOING_AWAY
    );

    session
        .conn
        .finish_close(CloseCode::GOING_AWAY, None)
        .await
        .expect("echo written");
    assert_eq!(
        session.next_outbound().await,
        OutboundFrame::Close(CloseFrame::new(CloseCode::GOING_AWAY, None))
    );
    assert_eq!(session.outbound.is_closed(), closes);
    assert!(session.close_transport().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn reset_fault_skips_close_frame(mut server_session: SessionHarness) {
    server_session.fault(TransportFault::Reset).await;
    let notification = server_session.next_notification().await;
    assert!(matches!(
        notification,
        Notification::Fault {
            fault: TransportFault::Reset,
            ..
        }
    ));
    assert!(server_session.outbound.try_recv().is_err());
    assert!(server_session.close_transport().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn transport_end_during_close_fails_pending_only(mut client_session: SessionHarness) {
    let pending = client_session
        .conn
        .begin_close(CloseCode::GOING_AWAY, None)
        .await
        .expect("close started");
    client_session.next_outbound().await;

    let remaining = client_session.close_transport().await;
    assert_eq!(pending.await, Err(CloseError::CloseWithoutEcho));
    assert!(remaining.is_empty(), "no abnormal closure: {remaining:?}");
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_is_not_terminal() {
    let config = ConnectionConfig::default().with_idle_timeout(Duration::from_secs(5));
    let mut session = SessionHarness::spawn_with(Role::Server, &config);
    let pending = session
        .conn
        .begin_close(CloseCode::NORMAL, None)
        .await
        .expect("close started");
    session.next_outbound().await;

    let notification = session.next_notification().await;
    assert!(matches!(notification, Notification::IdleTimeout(_)));
    assert_payload!(
        &notification,
        Payload::Control {
            signal: ControlSignal::IdleTimeout,
            data: None,
        }
    );

    session.frame(close(1000)).await;
    assert_eq!(pending.await, Ok(()), "idle timeout left the close pending");
    let remaining = session.close_transport().await;
    assert!(
        remaining.iter().all(|n| matches!(n, Notification::IdleTimeout(_))),
        "no abnormal closure: {remaining:?}"
    );
}

#[rstest]
#[tokio::test]
async fn messages_carry_connection_metadata(mut server_session: SessionHarness) {
    server_session.frame(RawFrame::text("meta")).await;
    let notification = server_session.next_notification().await;
    let message = notification.message().expect("message");
    assert_eq!(message.target(), wsgate_testing::harness::TARGET);
    assert_eq!(message.interface_id(), wsgate_testing::harness::INTERFACE);
    assert_eq!(message.session_id(), server_session.conn.session_id());
    assert_eq!(message.local_name(), "127.0.0.1");
    assert_eq!(server_session.conn.local_name(), message.local_name());
    assert_eq!(message.local_addr().port(), server_session.conn.local_port());
    assert!(!message.is_secure());
}
