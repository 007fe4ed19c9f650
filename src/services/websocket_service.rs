use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientRequest, ServerMessage},
    error::ProtocolError,
    state::{ClientConnection, SharedState},
};

/// Failure to reach the client behind a socket.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Handle the full lifecycle for an individual seed client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (sender, receiver) = socket.split();
    serve_connection(state, sender, receiver).await;
}

async fn serve_connection<S, R, E>(state: SharedState, mut sender: S, mut receiver: R)
where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let client_id = Uuid::new_v4();
    state.clients().insert(
        client_id,
        ClientConnection {
            id: client_id,
            tx: outbound_tx.clone(),
        },
    );
    info!(%client_id, clients = state.clients().len(), "client connected");

    // New clients get the current state right away instead of waiting for the next broadcast.
    let snapshot = state.snapshot().await;
    if send_message_to_websocket(&outbound_tx, &ServerMessage::from(snapshot)).is_err() {
        state.clients().remove(&client_id);
        finalize(writer_task, outbound_tx).await;
        return;
    }

    while let Some(message) = receiver.next().await {
        let outcome = match message {
            Ok(Message::Text(text)) => {
                handle_text(&state, client_id, &outbound_tx, text.as_str()).await
            }
            Ok(Message::Binary(payload)) => match std::str::from_utf8(&payload) {
                Ok(text) => handle_text(&state, client_id, &outbound_tx, text).await,
                Err(_) => reply_error(&outbound_tx, client_id, &ProtocolError::InvalidJson),
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
                Ok(())
            }
            Ok(Message::Pong(_)) => Ok(()),
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Err(err) => {
                warn!(%client_id, error = %err, "websocket error");
                break;
            }
        };

        if outcome.is_err() {
            info!(%client_id, "connection closed while replying, terminating");
            break;
        }
    }

    state.clients().remove(&client_id);
    info!(%client_id, clients = state.clients().len(), "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Validate one inbound text payload and act on it.
///
/// Increments are applied without a reply; the broadcast scheduler propagates
/// them. Validation failures are answered on the same connection.
pub async fn handle_text(
    state: &SharedState,
    client_id: Uuid,
    tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) -> Result<(), ClientError> {
    let request = match ClientRequest::from_json_str(text) {
        Ok(request) => request,
        Err(err) => return reply_error(tx, client_id, &err),
    };
    debug!(%client_id, kind = request.kind(), "received client message");

    match request {
        ClientRequest::Increment { matt, hail } => match state.apply_increment(&matt, &hail).await {
            Ok(changed) => {
                debug!(%client_id, changed, "increment applied");
                Ok(())
            }
            Err(err) => reply_error(tx, client_id, &err),
        },
        ClientRequest::UpdateRequest => {
            let snapshot = state.snapshot().await;
            send_message_to_websocket(tx, &ServerMessage::from(snapshot))
        }
    }
}

fn reply_error(
    tx: &mpsc::UnboundedSender<Message>,
    client_id: Uuid,
    err: &ProtocolError,
) -> Result<(), ClientError> {
    warn!(%client_id, code = err.code(), error = %err, "rejected client message");
    send_message_to_websocket(tx, &ServerMessage::from(err))
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; only a closed writer is
/// reported back.
pub(crate) fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ClientError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ClientError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
