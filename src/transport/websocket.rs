//! WebSocket ingestion endpoint
//!
//! Accepts TCP/WebSocket connections and turns each `submit` message into one
//! `Gateway::submit` call. Every text frame gets exactly one JSON reply:
//! `accepted`, `rejected`, `partial_failure` or `error`. Submissions from one
//! connection are handled in order; connections are independent.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::gateway::Gateway;
use crate::transport::message::{ClientMessage, ServerMessage};

/// Serves connections from `listener` until accepting fails.
pub async fn serve(listener: TcpListener, gateway: Arc<Gateway>) {
    if let Ok(addr) = listener.local_addr() {
        info!("WebSocket server listening on ws://{addr}");
    }

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed, shutting down listener");
                break;
            }
        };

        let gateway = gateway.clone();
        let client_id = format!("client-{}", uuid::Uuid::new_v4());
        debug!(%client_id, %peer, "connection accepted");

        tokio::spawn(handle_connection(stream, client_id, gateway));
    }
}

async fn handle_connection(stream: TcpStream, client_id: String, gateway: Arc<Gateway>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%client_id, error = %e, "WebSocket handshake error");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    {
        let client_id = client_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    warn!(%client_id, error = %e, "failed to send reply");
                    break;
                }
            }
            debug!(%client_id, "send loop closed");
        });
    }

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let reply = handle_text(&gateway, text.as_str()).await;
        let body = match serde_json::to_string(&reply) {
            Ok(body) => body,
            Err(e) => {
                warn!(%client_id, error = %e, "failed to encode reply");
                continue;
            }
        };
        if tx.send(WsMessage::Text(body.into())).is_err() {
            break;
        }
    }

    debug!(%client_id, "disconnected");
}

/// Decodes one client frame, submits it and builds the reply.
pub async fn handle_text(gateway: &Gateway, text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => gateway.submit(message.into()).await.into(),
        Err(e) => ServerMessage::Error {
            message: format!("invalid message: {e}"),
        },
    }
}
