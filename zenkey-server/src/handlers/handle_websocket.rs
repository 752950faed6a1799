use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zenkey_core::{ClientCommand, DevicePresence, ServerEvent};

use crate::infra::{
    app_state::AppState,
    scan::format::{FORMAT_DENIED_MESSAGE, simulate_format},
    websocket::{Connection, OUTBOUND_BUFFER, messages},
};

#[derive(Debug, Default, Deserialize)]
pub struct SocketParams {
    /// Session token from `/login`; absent for observers
    pub token: Option<String>,
}

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<SocketParams>,
) -> Response {
    let identity = params
        .token
        .as_deref()
        .and_then(|token| state.sessions.resolve(token))
        .map(|session| session.identity);

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Handle an individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    identity: Option<String>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    let connection = Arc::new(Connection::new(identity, tx));
    let conn_id = connection.id;
    info!(
        %conn_id,
        authenticated = connection.is_authenticated(),
        "client connected"
    );

    // Spawn task to handle outgoing messages
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match messages::event_to_websocket(&event) {
                Ok(frame) => {
                    if ws_sender.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "failed to encode event"),
            }
        }
        let _ = ws_sender.close().await;
    });

    if state
        .scan_service
        .attach(Arc::clone(&connection))
        .await
        .is_err()
    {
        warn!(%conn_id, "scan service unavailable; closing connection");
        writer.abort();
        return;
    }

    loop {
        let msg = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = ws_receiver.next() => msg,
        };

        match msg {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(frame @ (Message::Text(_) | Message::Binary(_)))) => {
                match messages::websocket_to_command(&frame) {
                    Ok(command) => {
                        handle_command(command, &state, &connection).await
                    }
                    Err(err) => {
                        debug!(%conn_id, error = %err, "ignoring unrecognised frame")
                    }
                }
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                debug!(%conn_id, error = %err, "WebSocket error");
                break;
            }
        }
    }

    // Clean up on disconnect
    state.websocket_manager.remove_connection(conn_id);
    drop(connection);
    writer.abort();
    info!(%conn_id, "client disconnected");
}

async fn handle_command(
    command: ClientCommand,
    state: &AppState,
    connection: &Arc<Connection>,
) {
    match command {
        ClientCommand::UsbCheck => {
            if state.scan_service.usb_check(connection.id).await.is_err() {
                connection.send_event(ServerEvent::usb_status(
                    &DevicePresence::absent(),
                ));
            }
        }
        ClientCommand::Analyze => {
            debug!(conn_id = %connection.id, "scan requested");
            if state
                .scan_service
                .request_scan(connection.id, connection.is_authenticated())
                .await
                .is_err()
            {
                connection.send_event(ServerEvent::scan_rejected(
                    "Scan service is not running.",
                ));
            }
        }
        ClientCommand::Format => {
            if connection.is_authenticated() {
                tokio::spawn(simulate_format(Arc::clone(connection)));
            } else {
                connection.send_event(ServerEvent::status(FORMAT_DENIED_MESSAGE));
            }
        }
        ClientCommand::Ping { timestamp } => {
            connection.send_event(ServerEvent::Pong { timestamp });
        }
    }
}
