use std::time::Duration;

use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use crate::registry::ConnectionRegistry;

/// A viewer slower than this is treated as disconnected.
const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    State(registry): State<ConnectionRegistry>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| {
        let (id, mut rx) = registry.subscribe().await;
        let (mut sender, mut receiver) = stream.split();

        let forward_task = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                match tokio::time::timeout(WS_SEND_TIMEOUT, sender.send(payload.into())).await {
                    Ok(Ok(())) => {}
                    // Dropping the receiver here makes the registry prune
                    // this viewer on its next broadcast.
                    Ok(Err(_)) | Err(_) => break,
                }
            }
        });

        // Inbound frames are drained and ignored; posting happens over HTTP.
        while let Some(Ok(_)) = receiver.next().await {}

        forward_task.abort();
        registry.unsubscribe(id).await;
    })
}
