use std::sync::Arc;

use axum::{
    body::Bytes,
    debug_handler,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::TransportError;

use super::{ClientEvent, Hub, Outbound, RoomId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HandshakeQuery {
    room_id: Option<RoomId>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Query(HandshakeQuery { room_id }): Query<HandshakeQuery>,
    State(hub): State<Arc<Hub>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, room_id))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, room_id: Option<RoomId>) {
    let conn_id = Uuid::new_v4();
    tracing::info!(conn_id = %conn_id, room_id = ?room_id, "Room socket connected");

    let mut rx = hub.connect(conn_id).await;

    // Canvas membership is settled before the first frame is read.
    if let Err(e) = hub.attach_on_handshake(conn_id, room_id).await {
        tracing::warn!(conn_id = %conn_id, error = %e, "Handshake attach failed");
        hub.detach(conn_id).await;
        return;
    }

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let msg = match outbound {
                Outbound::Event(event) => match serde_json::to_string(&event) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::warn!(conn_id = %conn_id, error = %e, "Failed to encode event");
                        continue;
                    }
                },
                Outbound::Ping => Message::Ping(Bytes::new()),
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "Room socket sink closed");
                break;
            }
        }
    });

    let recv_hub = Arc::clone(&hub);
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let msg = match frame {
                Ok(Message::Close(_)) => break,
                Ok(msg) => msg,
                Err(e) => {
                    let e = TransportError::from(e);
                    tracing::debug!(conn_id = %conn_id, error = %e, "Room socket receive error");
                    break;
                }
            };

            recv_hub.touch(conn_id).await;

            let event = match decode(msg) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(conn_id = %conn_id, error = %e, "Skipping frame");
                    continue;
                }
            };

            if let Err(e) = recv_hub.handle_event(conn_id, event).await {
                tracing::debug!(conn_id = %conn_id, error = %e, "Connection no longer attached");
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    };

    hub.detach(conn_id).await;
    tracing::info!(conn_id = %conn_id, "Room socket disconnected");
}

/// Control frames carry no event.
fn decode(msg: Message) -> Result<Option<ClientEvent>, TransportError> {
    match msg {
        Message::Text(text) => Ok(Some(serde_json::from_str(text.as_str())?)),
        Message::Binary(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => Ok(None),
    }
}
