//! Session lifecycle over in-memory streams.

use std::sync::Arc;

use drugwire_testing::{WsClient, client_frame, ping_frame};
use rstest::{fixture, rstest};
use serde_json::json;
use tokio::{
    io::{AsyncWriteExt, DuplexStream, duplex},
    task::JoinHandle,
};

use super::*;
use crate::{
    cache::LookupCache,
    protocol::DrugRecord,
    store::{RecordStore, SqliteStore},
};

type Outcome = (Result<CloseReason, SessionError>, SessionState);

#[fixture]
fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().expect("in-memory store should open"))
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        poll_interval: Duration::from_millis(1),
        ..SessionConfig::default()
    }
}

fn spawn_session(
    store: Arc<SqliteStore>,
    shutdown: CancellationToken,
) -> (DuplexStream, JoinHandle<Outcome>) {
    let (client, server) = duplex(256 * 1024);
    let dispatcher = Dispatcher::new(store, Arc::new(LookupCache::new()));
    let mut session = Session::new(None, dispatcher, fast_config(), shutdown);
    assert_eq!(session.state(), SessionState::Connecting);
    let handle = tokio::spawn(async move {
        let result = session.run(server).await;
        (result, session.state())
    });
    (client, handle)
}

#[rstest]
#[tokio::test]
async fn close_frame_ends_session(store: Arc<SqliteStore>) {
    let (io, handle) = spawn_session(store, CancellationToken::new());
    let mut client = WsClient::handshake(io).await.expect("handshake");

    client.send_close().await.expect("send close");
    let (result, state) = handle.await.expect("session task");

    assert!(matches!(result, Ok(CloseReason::ClientClosed)));
    assert_eq!(state, SessionState::Closed);
}

#[rstest]
#[tokio::test]
async fn dropped_client_is_end_of_stream(store: Arc<SqliteStore>) {
    let (io, handle) = spawn_session(store, CancellationToken::new());
    let client = WsClient::handshake(io).await.expect("handshake");

    drop(client);
    let (result, state) = handle.await.expect("session task");

    assert!(matches!(result, Ok(CloseReason::EndOfStream)));
    assert_eq!(state, SessionState::Closed);
}

#[rstest]
#[tokio::test]
async fn rejected_handshake_closes_without_reply(store: Arc<SqliteStore>) {
    let (mut io, handle) = spawn_session(store, CancellationToken::new());

    io.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .expect("write request");
    let (result, state) = handle.await.expect("session task");

    assert!(matches!(
        result,
        Err(SessionError::Handshake(HandshakeError::NotUpgrade))
    ));
    assert_eq!(state, SessionState::Closed);
}

#[rstest]
#[tokio::test]
async fn each_request_gets_one_reply_in_order(store: Arc<SqliteStore>) {
    let (io, handle) = spawn_session(store, CancellationToken::new());
    let mut client = WsClient::handshake(io).await.expect("handshake");

    client
        .send_json(&json!({"action": "noop_xyz"}))
        .await
        .expect("send");
    client
        .send_json(&json!({"action": "save_druginfo", "druginfo": {"name": "Aspirin"}}))
        .await
        .expect("send");
    let first = client.recv_json().await.expect("first reply");
    let second = client.recv_json().await.expect("second reply");

    assert_eq!(first["message"], json!("unknown action: noop_xyz"));
    assert_eq!(second["success"], json!(true));
    client.send_close().await.expect("send close");
    assert!(handle.await.expect("session task").0.is_ok());
}

#[rstest]
#[tokio::test]
async fn control_frames_produce_no_reply(store: Arc<SqliteStore>) {
    let (io, handle) = spawn_session(store, CancellationToken::new());
    let mut client = WsClient::handshake(io).await.expect("handshake");

    client.send_raw(&ping_frame(b"hi")).await.expect("ping");
    client.send_raw(&client_frame(0xA, &[])).await.expect("pong");
    let reply = client
        .request(&json!({"action": "query_druginfo", "name": "none"}))
        .await
        .expect("reply");

    assert_eq!(reply["message"], json!("found 0 records"));
    client.send_close().await.expect("send close");
    assert!(handle.await.expect("session task").0.is_ok());
}

#[rstest]
#[tokio::test]
async fn shutdown_closes_idle_session(store: Arc<SqliteStore>) {
    let shutdown = CancellationToken::new();
    let (io, handle) = spawn_session(store, shutdown.clone());
    let _client = WsClient::handshake(io).await.expect("handshake");

    shutdown.cancel();
    let (result, state) = handle.await.expect("session task");

    assert!(matches!(result, Ok(CloseReason::Shutdown)));
    assert_eq!(state, SessionState::Closed);
}

#[rstest]
#[tokio::test]
async fn invalid_text_is_fatal(store: Arc<SqliteStore>) {
    let (io, handle) = spawn_session(store, CancellationToken::new());
    let mut client = WsClient::handshake(io).await.expect("handshake");

    client
        .send_raw(&client_frame(0x1, &[0xff, 0xfe]))
        .await
        .expect("send");
    let (result, state) = handle.await.expect("session task");

    assert!(matches!(result, Err(SessionError::Codec(_))));
    assert_eq!(state, SessionState::Closed);
}

#[rstest]
#[tokio::test]
async fn oversized_reply_becomes_short_failure(store: Arc<SqliteStore>) {
    let note = "n".repeat(8_000);
    for lot in 0..10 {
        let record = DrugRecord {
            name: "Bulky".into(),
            lot_number: Some(format!("L{lot}")),
            note: Some(note.clone()),
            ..DrugRecord::default()
        };
        store.insert(record).await.expect("insert");
    }
    let (io, handle) = spawn_session(store, CancellationToken::new());
    let mut client = WsClient::handshake(io).await.expect("handshake");

    let reply = client
        .request(&json!({"action": "query_druginfo", "name": "Bulky"}))
        .await
        .expect("reply");
    let follow_up = client
        .request(&json!({"action": "query_druginfo", "name": "nothing"}))
        .await
        .expect("reply");

    assert_eq!(
        reply,
        json!({"success": false, "message": "response too large", "data": null})
    );
    assert_eq!(follow_up["success"], json!(true));
    client.send_close().await.expect("send close");
    assert!(handle.await.expect("session task").0.is_ok());
}

#[test]
fn oversized_custom_reply_keeps_correlation() {
    let reply = Reply::Custom(json!({
        "action": "get_druginfo_productdates_response",
        "requestId": "r-9",
        "success": true,
        "drugDates": [],
    }));

    assert_eq!(
        oversized_fallback(&reply),
        json!({
            "action": "get_druginfo_productdates_response",
            "requestId": "r-9",
            "success": false,
            "message": "response too large",
        })
    );
}

#[test]
fn connection_ids_are_distinct() {
    let a = ConnectionId::next();
    let b = ConnectionId::next();

    assert_ne!(a, b);
    assert_eq!(a.to_string(), format!("conn-{}", a.as_u64()));
}
