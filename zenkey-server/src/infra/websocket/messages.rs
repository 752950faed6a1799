use anyhow::Result;
use axum::extract::ws::{Message, Utf8Bytes};
use zenkey_core::{ClientCommand, ServerEvent};

/// Convert a ServerEvent to a WebSocket text frame
pub fn event_to_websocket(event: &ServerEvent) -> Result<Message> {
    let json = serde_json::to_string(event)?;
    Ok(Message::Text(Utf8Bytes::from(json)))
}

/// Convert a WebSocket data frame to a ClientCommand
pub fn websocket_to_command(msg: &Message) -> Result<ClientCommand> {
    match msg {
        Message::Text(text) => Ok(serde_json::from_str(text.as_str())?),
        Message::Binary(bin) => Ok(serde_json::from_slice(bin.as_ref())?),
        _ => Err(anyhow::anyhow!("Unsupported message type")),
    }
}
