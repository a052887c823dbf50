// WebSocket endpoint for live document sync and presence.
//
// One connection serves one authenticated user. The first frame must be
// a hello; after the handshake the client opens documents, sends
// debounced whole-content writes, and reports cursor movement. Change
// and presence notices fan out through per-document forwarder tasks
// feeding the connection's outbound queue.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use coscribe_common::protocol::{ws::WsMessage, SYNC_PROTOCOL};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub(crate) const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub(crate) const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
pub(crate) const MAX_FRAME_BYTES: usize = 262_144;

pub fn router(state: AppState) -> Router {
    Router::new().route("/v1/ws", get(ws_upgrade)).with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.max_frame_size(MAX_FRAME_BYTES).on_upgrade(move |socket| handle_socket(state, socket))
}

/// Per-connection state built after a successful hello.
struct Connection {
    /// Origin id for every write issued over this connection; notices
    /// carrying it are the connection's own echoes and are not relayed.
    conn_id: Uuid,
    user_id: Uuid,
    workspace_id: Uuid,
    outbound: mpsc::UnboundedSender<WsMessage>,
    /// Forwarder tasks per open document.
    open_docs: HashMap<Uuid, Vec<JoinHandle<()>>>,
}

impl Connection {
    fn abort_doc_tasks(&mut self, doc_id: Uuid) {
        if let Some(tasks) = self.open_docs.remove(&doc_id) {
            for task in tasks {
                task.abort();
            }
        }
    }
}

fn engine_error_frame(error: coscribe_engine::error::EngineError, doc_id: Option<Uuid>) -> WsMessage {
    let api_error = ApiError::from(error);
    WsMessage::Error {
        code: api_error.code().as_str().to_owned(),
        message: api_error.message().to_owned(),
        retryable: api_error.code().retryable(),
        doc_id,
    }
}

fn decode_message(raw: &str) -> Result<WsMessage, serde_json::Error> {
    serde_json::from_str::<WsMessage>(raw)
}

fn encode_message(message: &WsMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

async fn send_ws_message(socket: &mut WebSocket, message: &WsMessage) -> Result<(), ()> {
    let encoded = encode_message(message).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}

async fn handle_socket(state: AppState, mut socket: WebSocket) {
    // Handshake: the first frame must be a hello.
    let (user_id, workspace_id) = match socket.recv().await {
        Some(Ok(Message::Text(raw))) => match decode_message(&raw) {
            Ok(WsMessage::Hello { protocol, user_id, workspace_id }) => {
                if protocol != SYNC_PROTOCOL {
                    let _ = send_ws_message(
                        &mut socket,
                        &WsMessage::Error {
                            code: "SYNC_UNSUPPORTED_PROTOCOL".to_string(),
                            message: format!("unsupported protocol '{protocol}'"),
                            retryable: false,
                            doc_id: None,
                        },
                    )
                    .await;
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
                (user_id, workspace_id)
            }
            _ => {
                let _ = send_ws_message(
                    &mut socket,
                    &WsMessage::Error {
                        code: "SYNC_HELLO_REQUIRED".to_string(),
                        message: "first WebSocket message must be a hello frame".to_string(),
                        retryable: false,
                        doc_id: None,
                    },
                )
                .await;
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        },
        _ => return,
    };

    let hello_ack = WsMessage::HelloAck {
        server_time: Utc::now().to_rfc3339(),
        heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS as u32,
    };
    if send_ws_message(&mut socket, &hello_ack).await.is_err() {
        return;
    }

    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<WsMessage>();
    let mut conn = Connection {
        conn_id: Uuid::new_v4(),
        user_id,
        workspace_id,
        outbound: outbound_sender,
        open_docs: HashMap::new(),
    };
    debug!(conn_id = %conn.conn_id, user_id = %user_id, workspace_id = %workspace_id, "websocket session established");

    // Heartbeat: server pings every HEARTBEAT_INTERVAL_MS, disconnects
    // if no pong arrives within HEARTBEAT_TIMEOUT_MS.
    let mut heartbeat_interval =
        tokio::time::interval(std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    heartbeat_interval.reset(); // skip immediate first tick
    let mut last_pong = Instant::now();
    let heartbeat_timeout = std::time::Duration::from_millis(HEARTBEAT_TIMEOUT_MS);

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if last_pong.elapsed() > heartbeat_timeout {
                    warn!(conn_id = %conn.conn_id, "heartbeat timeout, disconnecting");
                    break;
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(outbound_message) => {
                        if send_ws_message(&mut socket, &outbound_message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw)) => {
                        let inbound = match decode_message(&raw) {
                            Ok(inbound) => inbound,
                            Err(_) => {
                                let frame = WsMessage::Error {
                                    code: "SYNC_INVALID_MESSAGE".to_string(),
                                    message: "invalid websocket frame payload".to_string(),
                                    retryable: false,
                                    doc_id: None,
                                };
                                if send_ws_message(&mut socket, &frame).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        let replies = dispatch_frame(&state, &mut conn, inbound).await;
                        let mut send_failed = false;
                        for reply in replies {
                            if send_ws_message(&mut socket, &reply).await.is_err() {
                                send_failed = true;
                                break;
                            }
                        }
                        if send_failed {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_pong = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    // Teardown: best-effort presence deactivation and subscription
    // release for every document still open on this connection.
    let open_doc_ids: Vec<Uuid> = conn.open_docs.keys().copied().collect();
    for doc_id in open_doc_ids {
        conn.abort_doc_tasks(doc_id);
        state.presence.deactivate(doc_id, conn.user_id).await;
        state.sync.close(doc_id, conn.conn_id).await;
    }
    debug!(conn_id = %conn.conn_id, "websocket session closed");
}

/// Routes one inbound frame and returns the direct replies to send.
async fn dispatch_frame(state: &AppState, conn: &mut Connection, frame: WsMessage) -> Vec<WsMessage> {
    match frame {
        WsMessage::Open { doc_id } => match handle_open(state, conn, doc_id).await {
            Ok(reply) => vec![reply],
            Err(frame) => vec![frame],
        },
        WsMessage::Write { doc_id, client_write_id, content } => {
            vec![handle_write(state, conn, doc_id, client_write_id, content).await]
        }
        WsMessage::Cursor { doc_id, cursor, sel_start, sel_end } => {
            // Fire-and-forget: presence failures never produce a frame.
            state.presence.upsert(doc_id, conn.user_id, cursor, sel_start, sel_end).await;
            Vec::new()
        }
        WsMessage::Close { doc_id } => {
            conn.abort_doc_tasks(doc_id);
            state.presence.deactivate(doc_id, conn.user_id).await;
            state.sync.close(doc_id, conn.conn_id).await;
            Vec::new()
        }
        _ => vec![WsMessage::Error {
            code: "SYNC_UNSUPPORTED_MESSAGE".to_string(),
            message: "message type is not valid in this direction".to_string(),
            retryable: false,
            doc_id: None,
        }],
    }
}

/// Opens a document: subscribes, spawns the change and presence
/// forwarders, and returns the initial document state.
async fn handle_open(
    state: &AppState,
    conn: &mut Connection,
    doc_id: Uuid,
) -> Result<WsMessage, WsMessage> {
    let opened = state
        .sync
        .open(doc_id, conn.user_id, conn.conn_id)
        .await
        .map_err(|error| engine_error_frame(error, Some(doc_id)))?;

    // A re-open replaces any forwarders from the prior subscription.
    conn.abort_doc_tasks(doc_id);

    let change_task = spawn_change_forwarder(opened.events, conn.outbound.clone(), conn.conn_id, doc_id);
    let presence_events = state.presence.subscribe(doc_id).await;
    let presence_task = spawn_presence_forwarder(
        presence_events,
        state.clone(),
        conn.outbound.clone(),
        conn.user_id,
        doc_id,
    );

    conn.open_docs.insert(doc_id, vec![change_task, presence_task]);

    Ok(WsMessage::DocState {
        doc_id,
        content: opened.content,
        baseline: opened.baseline,
        seq: opened.seq,
    })
}

async fn handle_write(
    state: &AppState,
    conn: &Connection,
    doc_id: Uuid,
    client_write_id: Uuid,
    content: String,
) -> WsMessage {
    match state.sync.write(doc_id, conn.user_id, conn.conn_id, content).await {
        Ok(ack) => WsMessage::WriteAck { doc_id, client_write_id, seq: ack.seq, applied: true },
        Err(error) => engine_error_frame(error, Some(doc_id)),
    }
}

/// Relays committed changes from other writers to this connection.
fn spawn_change_forwarder(
    mut events: broadcast::Receiver<coscribe_engine::store::DocEvent>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    conn_id: Uuid,
    doc_id: Uuid,
) -> JoinHandle<()> {
    use coscribe_engine::store::DocEvent;

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DocEvent::Changed(notice)) => {
                    if notice.origin == conn_id {
                        continue;
                    }
                    let frame = WsMessage::Change {
                        doc_id,
                        seq: notice.seq,
                        content: notice.content,
                        writer_id: notice.writer_id,
                    };
                    if outbound.send(frame).is_err() {
                        break;
                    }
                }
                Ok(DocEvent::Deleted { .. }) => {
                    let _ = outbound.send(WsMessage::Error {
                        code: "NOT_FOUND".to_string(),
                        message: "document was deleted".to_string(),
                        retryable: false,
                        doc_id: Some(doc_id),
                    });
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(doc_id = %doc_id, skipped, "change feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Recomputes and pushes the collaborator list on every presence event.
fn spawn_presence_forwarder(
    mut events: broadcast::Receiver<coscribe_engine::store::PresenceEvent>,
    state: AppState,
    outbound: mpsc::UnboundedSender<WsMessage>,
    user_id: Uuid,
    doc_id: Uuid,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(_) => {
                    let peers = state.presence.list(doc_id, user_id).await;
                    if outbound.send(WsMessage::Presence { doc_id, peers }).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(doc_id = %doc_id, skipped, "presence feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
