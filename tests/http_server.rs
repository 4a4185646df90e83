//! Exercises the full transport stack: a WebSocket listener observes a
//! write made through the REST surface, against a real bound port.

use std::net::SocketAddr;
use std::sync::Arc;

use flakbase::backend::MemoryBackend;
use flakbase::registry::Registry;
use flakbase::session::Dispatcher;
use flakbase::tree::Tree;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

async fn spawn_server() -> SocketAddr {
    let dispatcher =
        Dispatcher::new(Tree::new(Arc::new(MemoryBackend::new())), Arc::new(Registry::new()), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = flakbase::server::router(dispatcher, addr.to_string());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn next_json(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_ref()).unwrap(),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn websocket_listener_observes_a_rest_write() {
    let addr = spawn_server().await;

    let (mut ws, _response) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/")).await.unwrap();

    let handshake = next_json(&mut ws).await;
    assert_eq!(handshake["d"]["t"], "h");

    let listen = json!({"t": "d", "d": {"a": "l", "r": 1, "b": {"p": "/path", "t": 42}}});
    ws.send(Message::Text(listen.to_string().into())).await.unwrap();

    let ok = next_json(&mut ws).await;
    assert_eq!(ok["d"]["r"], 1);
    assert_eq!(ok["d"]["b"]["s"], "ok");

    let initial = next_json(&mut ws).await;
    assert_eq!(initial["d"]["b"]["d"], Value::Null);

    let client = reqwest::Client::new();
    let resp = client
        .put(format!("http://{addr}/path/id1.json"))
        .json(&json!({"text": "v1"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let pushed = next_json(&mut ws).await;
    assert_eq!(pushed["d"]["b"]["p"], "/path");
    assert_eq!(pushed["d"]["b"]["d"], json!({"id1": {"text": "v1"}}));
}

#[tracing_test::traced_test]
#[tokio::test]
async fn malformed_frame_is_logged_and_dropped_without_an_ok() {
    let addr = spawn_server().await;

    let (mut ws, _response) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/")).await.unwrap();
    next_json(&mut ws).await; // handshake

    ws.send(Message::Text("not json".into())).await.unwrap();

    // A well-formed request sent right after proves the connection stayed
    // alive and kept processing instead of tearing down on the bad frame.
    let put = json!({"t": "d", "d": {"a": "p", "r": 1, "b": {"p": "/a", "d": 1}}});
    ws.send(Message::Text(put.to_string().into())).await.unwrap();
    let ok = next_json(&mut ws).await;
    assert_eq!(ok["d"]["r"], 1);

    assert!(tracing_test::logs_contain("malformed request, dropping"));
}
