//! Axum websocket binding for the RPC server.
//!
//! Adapts one websocket to the duplex string channel [`crate::server::serve`]
//! expects. Each connection gets its own server task; closing the socket
//! tears the task down.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use mindhub_app::runtime::RuntimeApi;

use crate::server;

/// Build the RPC router, serving the protocol at `/api/ws`.
pub fn router(api: Arc<dyn RuntimeApi>) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(api)
}

async fn ws_handler(ws: WebSocketUpgrade, State(api): State<Arc<dyn RuntimeApi>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, api))
}

async fn handle_socket(socket: WebSocket, api: Arc<dyn RuntimeApi>) {
    debug!("rpc websocket connected");
    let (in_tx, in_rx) = mpsc::channel::<String>(32);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
    let server = tokio::spawn(server::serve(api, in_rx, out_tx));

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(text) => {
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    if in_tx.send(text.to_string()).await.is_err() {
                        break;
                    }
                }
                // Pings are answered by axum itself.
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(%err, "rpc websocket error");
                    break;
                }
            },
        }
    }

    drop(in_tx);
    server.abort();
    debug!("rpc websocket closed");
}
