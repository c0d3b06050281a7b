//! End-to-end tests over real WebSocket and TCP clients.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lobby_server::LobbyServer;
use lobby_server::server::ServerHandle;
use lobby_settings::LobbySettings;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

async fn boot_server() -> (LobbyServer, ServerHandle) {
    let mut settings = LobbySettings::default();
    settings.heartbeat.enabled = false;
    let server = LobbyServer::new(settings, None);
    let ws = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handle = server.serve(ws, Some(tcp)).unwrap();
    (server, handle)
}

fn request(id: u64, method: &str, params: Value) -> String {
    json!({ "id": id, "method": method, "params": params, "jsonrpc": "2.0" }).to_string()
}

fn notice(frame: &Value) -> Option<&str> {
    if frame["method"] == "notify" {
        frame["params"][0]["message"].as_str()
    } else {
        None
    }
}

// ── WebSocket ──

async fn ws_connect(handle: &ServerHandle) -> WsStream {
    let url = format!("ws://{}/ws", handle.ws_addr);
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn ws_next(ws: &mut WsStream) -> Option<Message> {
    timeout(TIMEOUT, ws.next()).await.unwrap().map(Result::unwrap)
}

/// Read JSON frames until one satisfies `pred`.
async fn ws_until(ws: &mut WsStream, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        match ws_next(ws).await {
            Some(Message::Text(text)) => {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                if pred(&frame) {
                    return frame;
                }
            }
            Some(_) => {}
            None => panic!("socket closed before the expected frame"),
        }
    }
}

#[tokio::test]
async fn ws_client_is_greeted_and_answered() {
    let (_server, handle) = boot_server().await;
    let mut ws = ws_connect(&handle).await;
    let _ = ws_until(&mut ws, |f| notice(f) == Some("You joined the server")).await;

    ws.send(Message::Text(request(1, "show-stats", json!([])).into())).await.unwrap();
    let reply = ws_until(&mut ws, |f| f["id"] == 1 && f.get("method").is_none()).await;
    assert_eq!(reply["result"], json!({ "users": 1, "rooms": 0 }));
    assert!(reply["error"].is_null());

    handle.stop(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn ws_batch_gets_one_array_reply() {
    let (_server, handle) = boot_server().await;
    let mut ws = ws_connect(&handle).await;

    let batch = format!("[{},{}]", request(2, "show-stats", json!([])), request(3, "no-such-method", json!([])));
    ws.send(Message::Text(batch.into())).await.unwrap();
    let reply = ws_until(&mut ws, Value::is_array).await;
    let replies = reply.as_array().unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], 2);
    assert_eq!(replies[1]["id"], 3);
    // unknown methods fail the role gate first
    assert_eq!(replies[1]["error"]["code"], -32403);

    handle.stop(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn ws_malformed_frame_closes_connection() {
    let (server, handle) = boot_server().await;
    let mut ws = ws_connect(&handle).await;
    let _ = ws_until(&mut ws, |f| notice(f).is_some()).await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let reply = ws_until(&mut ws, |f| !f["error"].is_null()).await;
    assert!(reply["id"].is_null());
    assert_eq!(reply["error"]["code"], -32700);

    loop {
        match ws_next(&mut ws).await {
            Some(Message::Close(_)) | None => break,
            Some(_) => {}
        }
    }
    assert_eq!(server.lobby().lock().users().count(), 0);

    handle.stop(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn ws_dropped_peer_is_announced() {
    let (_server, handle) = boot_server().await;
    let mut a = ws_connect(&handle).await;
    let _ = ws_until(&mut a, |f| notice(f) == Some("You joined the server")).await;
    let mut b = ws_connect(&handle).await;
    let _ = ws_until(&mut a, |f| notice(f) == Some("A user joined the server")).await;

    // a transport close without `leave` counts as a broken connection
    b.close(None).await.unwrap();
    let _ = ws_until(&mut a, |f| notice(f) == Some("A user unexpectedly disconnected from the server")).await;

    handle.stop(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn ws_relay_is_forwarded_as_binary() {
    let (_server, handle) = boot_server().await;
    let mut a = ws_connect(&handle).await;
    let mut b = ws_connect(&handle).await;

    a.send(Message::Text(request(1, "create-room", json!(["alpha"])).into())).await.unwrap();
    let _ = ws_until(&mut a, |f| f["id"] == 1 && f.get("method").is_none()).await;
    a.send(Message::Text(request(2, "set-value", json!(["room.relay", true])).into())).await.unwrap();
    let _ = ws_until(&mut a, |f| f["id"] == 2 && f.get("method").is_none()).await;
    b.send(Message::Text(request(1, "join-room", json!(["alpha"])).into())).await.unwrap();
    let _ = ws_until(&mut b, |f| f["id"] == 1 && f.get("method").is_none()).await;

    let payload = b"relay \x00\xff\r\n".to_vec();
    a.send(Message::Binary(payload.clone().into())).await.unwrap();
    loop {
        match ws_next(&mut b).await {
            Some(Message::Binary(bytes)) => {
                assert_eq!(bytes.as_ref(), payload.as_slice());
                break;
            }
            Some(_) => {}
            None => panic!("socket closed before the relay frame"),
        }
    }

    handle.stop(Some(TIMEOUT)).await;
}

// ── TCP ──

struct TcpClient {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl TcpClient {
    async fn connect(handle: &ServerHandle) -> Self {
        let stream = TcpStream::connect(handle.tcp_addr.unwrap()).await.unwrap();
        let (read, write) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    async fn send(&mut self, line: &str) {
        self.write.write_all(line.as_bytes()).await.unwrap();
        self.write.write_all(b"\n").await.unwrap();
    }

    async fn next_line(&mut self) -> Option<String> {
        timeout(TIMEOUT, self.lines.next_line()).await.unwrap().unwrap()
    }

    async fn until(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        loop {
            let line = self.next_line().await.expect("stream closed before the expected frame");
            if let Ok(frame) = serde_json::from_str::<Value>(&line) {
                if pred(&frame) {
                    return frame;
                }
            }
        }
    }

    async fn call(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.send(&request(id, method, params)).await;
        self.until(|f| f["id"] == id && f.get("method").is_none()).await
    }
}

#[tokio::test]
async fn tcp_client_speaks_newline_json() {
    let (_server, handle) = boot_server().await;
    let mut client = TcpClient::connect(&handle).await;
    let _ = client.until(|f| notice(f) == Some("You joined the server")).await;

    let reply = client.call(7, "show-stats", json!([])).await;
    assert_eq!(reply["result"]["users"], 1);

    handle.stop(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn tcp_leave_replies_then_closes() {
    let (server, handle) = boot_server().await;
    let mut client = TcpClient::connect(&handle).await;

    let reply = client.call(1, "leave", json!([])).await;
    assert!(reply["result"].is_null());
    assert!(reply["error"].is_null());
    while client.next_line().await.is_some() {}
    assert_eq!(server.lobby().lock().users().count(), 0);

    handle.stop(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn tcp_relay_reaches_room_peers() {
    let (_server, handle) = boot_server().await;
    let mut a = TcpClient::connect(&handle).await;
    let mut b = TcpClient::connect(&handle).await;

    let room = a.call(1, "create-room", json!(["alpha"])).await;
    assert_eq!(room["result"]["name"], "alpha");
    let _ = a.call(2, "set-value", json!(["room.relay", true])).await;
    let joined = b.call(1, "join-room", json!(["alpha"])).await;
    assert_eq!(joined["result"]["user_count"], 2);

    a.send("relay hello").await;
    loop {
        let line = b.next_line().await.expect("relay frame");
        if line == "relay hello" {
            break;
        }
    }

    handle.stop(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn relay_is_refused_outside_rooms() {
    let (_server, handle) = boot_server().await;
    let mut a = TcpClient::connect(&handle).await;
    a.send("relay hello").await;
    let err = a.until(|f| notice(f) == Some("You cannot relay outside of a room!")).await;
    assert_eq!(err["params"][0]["code"], "error");

    handle.stop(Some(TIMEOUT)).await;
}
