use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::sync::TrackerStore;
use crate::tracker::motion::LatLon;
use crate::tracker::render::{BroadcastRenderer, MarkerHandle, MarkerInfo};

#[derive(Clone)]
pub struct WsState {
    pub renderer: BroadcastRenderer,
    pub tracker: TrackerStore,
}

#[derive(Debug, Serialize)]
struct MarkerState {
    marker: MarkerHandle,
    position: LatLon,
    info: MarkerInfo,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Connected,
    /// Full marker state, sent on connect and after a lagged stream.
    Snapshot { markers: Vec<MarkerState> },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn snapshot(tracker: &TrackerStore) -> ServerMessage {
    let tracker = tracker.read().await;
    let markers = tracker
        .vehicles()
        .values()
        .map(|record| MarkerState {
            marker: record.marker,
            position: record.position,
            info: record.marker_info(),
        })
        .collect();
    ServerMessage::Snapshot { markers }
}

async fn send_json<T: Serialize>(sender: &mut (impl SinkExt<Message> + Unpin), value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "Failed to encode websocket message");
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    // subscribe before the snapshot so no event falls in the gap
    let mut events = state.renderer.subscribe();
    let (mut sender, mut receiver) = socket.split();

    if !send_json(&mut sender, &ServerMessage::Connected).await {
        return;
    }
    if !send_json(&mut sender, &snapshot(&state.tracker).await).await {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !send_json(&mut sender, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // the stream skipped events, resync from scratch
                    debug!(missed, "Websocket client lagged, resending snapshot");
                    if !send_json(&mut sender, &snapshot(&state.tracker).await).await {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("Websocket client disconnected");
}

pub fn router(state: WsState) -> Router {
    Router::new()
        .route("/vehicles", get(ws_handler))
        .with_state(state)
}
