//! WebSocket connection handler
//!
//! Upgrades any request that asks for it, validates the handshake query and
//! bridges the socket to the relay hub. Plain HTTP requests fall through to the
//! static asset directory.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, Request, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::registry::{Connection, ConnectionId, Handshake, HandshakeParams};
use crate::server::RelayState;

/// Entry point for every request that is not `/health`
pub async fn relay_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<RelayState>,
    request: Request,
) -> Response {
    match upgrade {
        Ok(ws) => {
            let params = match Query::<HandshakeParams>::try_from_uri(request.uri()) {
                Ok(Query(params)) => params,
                Err(e) => {
                    debug!(
                        "Unparseable handshake query {:?}, treating as remote: {}",
                        request.uri().query(),
                        e
                    );
                    HandshakeParams::default()
                }
            };
            ws.on_upgrade(move |socket| handle_socket(socket, params, state))
        }
        Err(_) => serve_static(&state, request).await,
    }
}

async fn serve_static(state: &RelayState, request: Request) -> Response {
    match ServeDir::new(&*state.static_dir).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(mut socket: WebSocket, params: HandshakeParams, state: RelayState) {
    let handshake = match Handshake::try_from(params) {
        Ok(handshake) => handshake,
        Err(e) => {
            debug!("{}", e);
            if let Err(e) = socket.send(WsMessage::Close(None)).await {
                debug!("Failed to close rejected socket: {}", e);
            }
            return;
        }
    };

    let id = ConnectionId::new();
    let class = handshake.class;
    info!("New {} connection: {}", class, id);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outgoing frames queued by the hub
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if let Err(e) = state.relay.connect(Connection::new(id, handshake, tx)) {
        error!("Cannot register {}: {}", id, e);
        return;
    }

    let send_task = async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(frame.into())).await.is_err() {
                debug!("Send task ended for {}: socket write failed", id);
                return;
            }
        }
        // the hub dropped this connection
        let _ = ws_tx.send(WsMessage::Close(None)).await;
        debug!("Send task ended for {}: deregistered", id);
    };

    let relay = state.relay.clone();
    let recv_task = async move {
        while let Some(msg) = ws_rx.next().await {
            let text = match msg {
                Ok(WsMessage::Text(text)) => text.as_str().to_owned(),
                Ok(WsMessage::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("Dropping non-UTF-8 binary frame from {}", id);
                        continue;
                    }
                },
                Ok(WsMessage::Close(_)) => {
                    debug!("Client closed connection: {}", id);
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("WebSocket error on {}: {}", id, e);
                    break;
                }
            };
            if relay.frame(id, text).is_err() {
                break;
            }
        }
        debug!("Receive task ended for {}", id);
    };

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    let _ = state.relay.disconnect(id);
    info!("{} connection closed: {}", class, id);
}
