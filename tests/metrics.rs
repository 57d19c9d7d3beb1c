#![cfg(feature = "metrics")]
//! Tests for `wsgate` metrics.
//!
//! These tests drive a frame state machine under a thread-local
//! `metrics_util::debugging::DebuggingRecorder` and check the recorded values.

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use tokio::sync::mpsc::UnboundedReceiver;
use wsgate::{
    ChannelSink,
    ChannelWriter,
    ConnectionInfo,
    FrameStateMachine,
    Notification,
    OutboundReceiver,
    RawFrame,
    Role,
    TransportFault,
    metrics::{ABNORMAL_CLOSURES, FAULTS_TOTAL, FRAMES_RECEIVED},
};

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

struct Machine {
    state: FrameStateMachine,
    _notifications: UnboundedReceiver<Notification>,
    _outbound: OutboundReceiver,
}

fn machine() -> Machine {
    let local = "127.0.0.1:9000".parse().expect("parse address");
    let info = ConnectionInfo::new(Role::Server, "/m", "metrics", local);
    let (sink, notifications) = ChannelSink::new();
    let (writer, outbound) = ChannelWriter::new();
    Machine {
        state: FrameStateMachine::new(Arc::new(info), Arc::new(sink), Arc::new(writer)),
        _notifications: notifications,
        _outbound: outbound,
    }
}

fn counter_value(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && label.is_none_or(|(k, v)| {
                    key.key().labels().any(|l| l.key() == k && l.value() == v)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case::text(RawFrame::text("a"), "text")]
#[case::binary(RawFrame::binary(vec![0]), "binary")]
#[case::ping(RawFrame::ping("p"), "ping")]
#[case::pong(RawFrame::pong("p"), "pong")]
fn classified_frames_are_counted_by_kind(#[case] frame: RawFrame, #[case] kind: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let mut machine = machine();
    metrics::with_local_recorder(&recorder, || {
        machine.state.on_frame(frame).expect("valid frame");
    });
    assert_eq!(
        counter_value(&snapshotter, FRAMES_RECEIVED, Some(("kind", kind))),
        1
    );
}

#[test]
fn unrecognised_frames_are_not_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let mut machine = machine();
    metrics::with_local_recorder(&recorder, || {
        machine
            .state
            .on_frame(RawFrame::new(0xB, true, "x"))
            .expect_err("unknown opcode");
    });
    assert_eq!(counter_value(&snapshotter, FRAMES_RECEIVED, None), 0);
}

#[test]
fn abnormal_closure_and_faults_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let mut clean = machine();
        clean.state.on_transport_closed();

        let mut faulted = machine();
        faulted.state.on_fault(TransportFault::Reset);
        faulted.state.on_fault(TransportFault::Reset);
        faulted.state.on_transport_closed();
    });
    assert_eq!(counter_value(&snapshotter, ABNORMAL_CLOSURES, None), 1);
    assert_eq!(
        counter_value(&snapshotter, FAULTS_TOTAL, Some(("kind", "reset"))),
        1
    );
}
