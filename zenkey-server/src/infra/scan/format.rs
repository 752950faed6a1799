//! Simulated device formatting.
//!
//! No formatting tool is invoked and no shared state changes; the requester
//! just sees a status notice, a +10 progress ramp every 500 ms and a
//! completion event.

use std::{sync::Arc, time::Duration};

use tokio::time;
use tracing::debug;
use zenkey_core::ServerEvent;

use crate::infra::websocket::Connection;

pub const FORMAT_STEP: u8 = 10;
pub const FORMAT_INTERVAL: Duration = Duration::from_millis(500);
pub const FORMAT_STARTED_MESSAGE: &str =
    "Formatting is simulated and does not modify the device";
pub const FORMAT_DENIED_MESSAGE: &str =
    "Authentication required to format the device.";

/// Runs the simulation to completion or until the requester goes away.
pub async fn simulate_format(connection: Arc<Connection>) {
    if connection
        .send_message(ServerEvent::status(FORMAT_STARTED_MESSAGE))
        .await
        .is_err()
    {
        return;
    }

    let mut progress = 0u8;
    while progress < 100 {
        time::sleep(FORMAT_INTERVAL).await;
        progress = progress.saturating_add(FORMAT_STEP).min(100);
        if connection
            .send_message(ServerEvent::FormatProgress { progress })
            .await
            .is_err()
        {
            debug!(conn_id = %connection.id, progress, "format simulation abandoned");
            return;
        }
    }

    let _ = connection
        .send_message(ServerEvent::FormatComplete { success: true })
        .await;
}
