//! Tests for the `DrugServer` builder and listener binding.

use std::{net::SocketAddr, time::Duration};

use rstest::rstest;
use tokio::sync::oneshot;

use super::*;
use crate::{
    codec::{MAX_FRAME_LENGTH, MIN_FRAME_LENGTH},
    server::test_util::{bind_server, dispatcher, free_listener, listener_addr},
};

#[rstest]
fn new_server_uses_defaults(dispatcher: Dispatcher) {
    let server = DrugServer::new(dispatcher);

    assert!(server.local_addr().is_none());
    assert!(!server.is_tls());
    assert_eq!(server.session_settings(), &SessionConfig::default());
    assert_eq!(server.grace(), DEFAULT_SHUTDOWN_GRACE);
    assert_eq!(server.backoff(), BackoffConfig::default());
}

#[rstest]
fn session_settings_chain(dispatcher: Dispatcher) {
    let server = DrugServer::new(dispatcher)
        .poll_interval(Duration::from_millis(5))
        .handshake_timeout(None)
        .shutdown_grace(Duration::from_secs(1));

    let settings = server.session_settings();
    assert_eq!(settings.poll_interval, Duration::from_millis(5));
    assert_eq!(settings.handshake_timeout, None);
    assert_eq!(server.grace(), Duration::from_secs(1));
}

#[rstest]
#[case(0, MIN_FRAME_LENGTH)]
#[case(4096, 4096)]
#[case(usize::MAX, MAX_FRAME_LENGTH)]
fn frame_ceiling_is_clamped(
    dispatcher: Dispatcher,
    #[case] requested: usize,
    #[case] expected: usize,
) {
    let server = DrugServer::new(dispatcher).max_frame_length(requested);

    assert_eq!(server.session_settings().max_frame_length, expected);
}

#[rstest]
fn backoff_is_normalised(dispatcher: Dispatcher) {
    let server = DrugServer::new(dispatcher).accept_backoff(BackoffConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::ZERO,
    });

    assert_eq!(
        server.backoff(),
        BackoffConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
        }
    );
}

#[rstest]
#[tokio::test]
async fn binding_existing_listener_reports_its_address(
    dispatcher: Dispatcher,
    free_listener: std::net::TcpListener,
) {
    let expected = listener_addr(&free_listener);
    let server = bind_server(dispatcher, free_listener);

    assert_eq!(server.local_addr(), Some(expected));
}

#[rstest]
#[tokio::test]
async fn rebinding_keeps_configuration(
    dispatcher: Dispatcher,
    free_listener: std::net::TcpListener,
) {
    let (tx, _rx) = oneshot::channel();
    let server = DrugServer::new(dispatcher)
        .poll_interval(Duration::from_millis(7))
        .ready_signal(tx)
        .bind_existing_listener(free_listener)
        .expect("bind");

    let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let server = server.bind(addr).expect("rebind");

    assert!(server.local_addr().is_some());
    assert!(server.ready_tx.is_some());
    assert_eq!(server.session_settings().poll_interval, Duration::from_millis(7));
}

#[rstest]
#[tokio::test]
async fn bind_to_taken_port_fails(dispatcher: Dispatcher, free_listener: std::net::TcpListener) {
    let taken = listener_addr(&free_listener);

    let err = DrugServer::new(dispatcher)
        .bind(taken)
        .err()
        .expect("port is already bound");

    assert!(matches!(err, crate::server::ServerError::Bind(_)));
}
