#![cfg(feature = "metrics")]
//! Tests for `drugwire` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

#[rstest]
#[case(drugwire::metrics::Direction::Inbound, "inbound")]
#[case(drugwire::metrics::Direction::Outbound, "outbound")]
fn frame_metric_is_labelled_by_direction(
    #[case] direction: drugwire::metrics::Direction,
    #[case] label: &str,
) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        drugwire::metrics::inc_frames(direction);
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == drugwire::metrics::FRAMES_PROCESSED
            && k.key()
                .labels()
                .any(|l| l.key() == "direction" && l.value() == label)
            && matches!(v, DebugValue::Counter(c) if *c > 0)
    });
    assert!(found, "{label} frames metric not recorded");
}

#[rstest]
#[case(drugwire::metrics::ERRORS_TOTAL, drugwire::metrics::inc_errors as fn(), 1)]
#[case(drugwire::metrics::HANDSHAKE_FAILURES, drugwire::metrics::inc_handshake_failures as fn(), 2)]
#[case(drugwire::metrics::CONNECTION_PANICS, drugwire::metrics::inc_connection_panics as fn(), 3)]
fn counters_accumulate(#[case] name: &str, #[case] bump: fn(), #[case] expected: u64) {
    // Arrange
    let (snapshotter, recorder) = debugging_recorder_setup();

    // Act
    metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| bump());
    });

    // Assert
    assert_counter_eq(&snapshotter, name, expected);
}

#[test]
fn connection_gauge_returns_to_zero() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        drugwire::metrics::inc_connections();
        drugwire::metrics::inc_connections();
        drugwire::metrics::dec_connections();
        drugwire::metrics::dec_connections();
    });

    let metrics = snapshotter.snapshot().into_vec();
    assert!(metrics.iter().any(|(key, _, _, value)| {
        key.key().name() == drugwire::metrics::CONNECTIONS_ACTIVE
            && matches!(value, DebugValue::Gauge(g) if g.into_inner().abs() < f64::EPSILON)
    }));
}

fn assert_counter_eq(snapshotter: &Snapshotter, name: &str, expected: u64) {
    let metrics = snapshotter.snapshot().into_vec();
    assert!(
        metrics.iter().any(|(key, _, _, value)| {
            key.key().name() == name && matches!(value, DebugValue::Counter(c) if *c == expected)
        }),
        "expected {name} == {expected}, got {metrics:#?}"
    );
}
