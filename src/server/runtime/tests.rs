//! Tests for server runtime behaviour.

use std::{
    future::pending,
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use drugwire_testing::WsClient;
use rstest::rstest;
use serde_json::json;
use tokio::{
    net::TcpListener,
    sync::{Notify, oneshot},
    task::yield_now,
    time::{Duration, Instant, advance, timeout},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{AcceptLoopOptions, BackoffConfig, MockAcceptListener, accept_loop};
use crate::{
    cache::LookupCache,
    dispatch::Dispatcher,
    protocol::DrugRecord,
    server::{
        DrugServer,
        connection::ConnectionContext,
        test_util::{bind_server, dispatcher, free_listener, listener_addr},
    },
    session::SessionConfig,
    store::{RecordStore, StoreError},
};

fn context(dispatcher: Dispatcher, shutdown: &CancellationToken) -> ConnectionContext {
    ConnectionContext {
        dispatcher,
        session: SessionConfig::default(),
        tls: None,
        shutdown: shutdown.clone(),
    }
}

#[rstest]
#[tokio::test]
async fn test_run_with_immediate_shutdown(
    dispatcher: Dispatcher,
    free_listener: std::net::TcpListener,
) {
    let server = bind_server(dispatcher, free_listener);
    let shutdown_future = async { tokio::time::sleep(Duration::from_millis(10)).await };
    let result = timeout(
        Duration::from_millis(1000),
        server.run_with_shutdown(shutdown_future),
    )
    .await;
    assert!(result.is_ok());
    assert!(result.expect("server did not finish in time").is_ok());
}

#[rstest]
#[tokio::test]
async fn ready_signal_fires_before_serving(
    dispatcher: Dispatcher,
    free_listener: std::net::TcpListener,
) {
    let addr = listener_addr(&free_listener);
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = DrugServer::new(dispatcher)
        .ready_signal(ready_tx)
        .bind_existing_listener(free_listener)
        .expect("bind");
    let handle = tokio::spawn(server.run_with_shutdown(async {
        let _ = stop_rx.await;
    }));

    ready_rx.await.expect("ready signal");
    let mut client = WsClient::connect(addr).await.expect("connect");
    let reply = client
        .request(&json!({"action": "query_druginfo", "name": "x"}))
        .await
        .expect("reply");
    assert_eq!(reply["success"], json!(true));

    let _ = stop_tx.send(());
    handle
        .await
        .expect("server join error")
        .expect("server run failed");
}

#[rstest]
#[tokio::test]
async fn shutdown_closes_open_sessions(
    dispatcher: Dispatcher,
    free_listener: std::net::TcpListener,
) {
    let addr = listener_addr(&free_listener);
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = DrugServer::new(dispatcher)
        .ready_signal(ready_tx)
        .bind_existing_listener(free_listener)
        .expect("bind");
    let handle = tokio::spawn(server.run_with_shutdown(async {
        let _ = stop_rx.await;
    }));
    ready_rx.await.expect("ready signal");
    let mut client = WsClient::connect(addr).await.expect("connect");

    let _ = stop_tx.send(());
    let closed = timeout(Duration::from_secs(2), client.is_closed_by_peer())
        .await
        .expect("session should close promptly");

    assert!(closed.unwrap_or(true));
    timeout(Duration::from_secs(2), handle)
        .await
        .expect("server should stop within the grace period")
        .expect("server join error")
        .expect("server run failed");
}

/// Never answers, so a session stays inside dispatch.
struct StalledStore(Arc<Notify>);

#[async_trait]
impl RecordStore for StalledStore {
    async fn insert(&self, _record: DrugRecord) -> Result<(), StoreError> { pending().await }

    async fn find_by_name(&self, _fragment: &str) -> Result<Vec<DrugRecord>, StoreError> {
        self.0.notify_one();
        pending().await
    }

    async fn upsert_manufacture_date(&self, _name: &str, _date: &str) -> Result<(), StoreError> {
        pending().await
    }

    async fn latest_manufacture_date(&self, _name: &str) -> Result<Option<String>, StoreError> {
        pending().await
    }
}

#[rstest]
#[tokio::test]
async fn stuck_sessions_are_abandoned_after_grace(free_listener: std::net::TcpListener) {
    let addr = listener_addr(&free_listener);
    let entered = Arc::new(Notify::new());
    let store = StalledStore(Arc::clone(&entered));
    let dispatcher = Dispatcher::new(Arc::new(store), Arc::new(LookupCache::new()));
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = DrugServer::new(dispatcher)
        .ready_signal(ready_tx)
        .shutdown_grace(Duration::from_millis(50))
        .bind_existing_listener(free_listener)
        .expect("bind");
    let handle = tokio::spawn(server.run_with_shutdown(async {
        let _ = stop_rx.await;
    }));
    ready_rx.await.expect("ready signal");
    let mut client = WsClient::connect(addr).await.expect("connect");
    client
        .send_json(&json!({"action": "query_druginfo", "name": "x"}))
        .await
        .expect("send");
    entered.notified().await;

    let started = std::time::Instant::now();
    let _ = stop_tx.send(());
    timeout(Duration::from_secs(2), handle)
        .await
        .expect("server must not wait for stuck sessions")
        .expect("server join error")
        .expect("server run failed");

    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[rstest]
#[tokio::test]
async fn test_accept_loop_shutdown_signal(dispatcher: Dispatcher) {
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let listener = Arc::new(
        TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener"),
    );

    tracker.spawn(accept_loop(
        listener,
        context(dispatcher, &token),
        AcceptLoopOptions {
            shutdown: token.clone(),
            tracker: tracker.clone(),
            backoff: BackoffConfig::default(),
        },
    ));

    token.cancel();
    tracker.close();

    let result = timeout(Duration::from_millis(100), tracker.wait()).await;
    assert!(result.is_ok());
}

/// Creates a mock listener that fails every accept, logging when it was called.
fn setup_backoff_mock_listener(
    calls: &Arc<Mutex<Vec<Instant>>>,
    num_calls: usize,
) -> MockAcceptListener {
    let mut listener = MockAcceptListener::new();
    let call_log = Arc::clone(calls);
    listener
        .expect_accept()
        .returning(move || {
            let call_log = Arc::clone(&call_log);
            Box::pin(async move {
                call_log.lock().expect("lock").push(Instant::now());
                Err(io::Error::other("mock error"))
            })
        })
        .times(num_calls);
    listener
        .expect_local_addr()
        .returning(|| Ok("127.0.0.1:0".parse().expect("addr parse")))
        .times(num_calls);
    listener
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_accept_loop_exponential_backoff_async(dispatcher: Dispatcher) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(setup_backoff_mock_listener(&calls, 4));
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let backoff = BackoffConfig {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    };

    tracker.spawn(accept_loop(
        listener,
        context(dispatcher, &token),
        AcceptLoopOptions {
            shutdown: token.clone(),
            tracker: tracker.clone(),
            backoff,
        },
    ));

    yield_now().await;
    assert_eq!(calls.lock().expect("lock").len(), 1);

    for ms in [5, 10, 20] {
        advance(Duration::from_millis(ms)).await;
        yield_now().await;
    }

    token.cancel();
    advance(Duration::from_millis(20)).await;
    yield_now().await;
    tracker.close();
    tracker.wait().await;

    let calls = calls.lock().expect("lock");
    let intervals: Vec<Duration> = calls
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]))
        .collect();
    assert_eq!(
        intervals,
        [5, 10, 20].map(Duration::from_millis).to_vec(),
        "accept retries should double up to the cap"
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_accept_backoff(dispatcher: Dispatcher) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(setup_backoff_mock_listener(&calls, 1));
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let backoff = BackoffConfig {
        initial_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(10),
    };

    tracker.spawn(accept_loop(
        listener,
        context(dispatcher, &token),
        AcceptLoopOptions {
            shutdown: token.clone(),
            tracker: tracker.clone(),
            backoff,
        },
    ));

    yield_now().await;
    assert_eq!(calls.lock().expect("lock").len(), 1);

    let started = Instant::now();
    token.cancel();
    tracker.close();
    timeout(Duration::from_millis(1), tracker.wait())
        .await
        .expect("accept loop should stop without finishing its back-off");

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(calls.lock().expect("lock").len(), 1);
}
