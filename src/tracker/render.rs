use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use super::motion::LatLon;

/// Opaque presentation handle. The tracker never looks inside it, it
/// only hands it back to the renderer that issued it.
pub type MarkerHandle = u64;

/// What a marker should say about its vehicle, recomputed every cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerInfo {
    pub trip_id: String,
    pub route: String,
    pub destination: String,
    pub platform: String,
    pub delay_seconds: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkerEvent {
    Add {
        marker: MarkerHandle,
        position: LatLon,
        info: MarkerInfo,
    },
    Move {
        marker: MarkerHandle,
        from: LatLon,
        to: LatLon,
        info: MarkerInfo,
    },
    Remove {
        marker: MarkerHandle,
    },
}

/// Presentation boundary. The tracker drives one of these and stays
/// ignorant of how markers are actually shown.
pub trait Renderer: Send + Sync {
    fn create_marker(&self, position: LatLon, info: &MarkerInfo) -> MarkerHandle;
    fn update_marker(&self, marker: MarkerHandle, from: LatLon, to: LatLon, info: &MarkerInfo);
    fn remove_marker(&self, marker: MarkerHandle);
}

/// Fans marker events out to websocket subscribers. Slow subscribers
/// may miss events, they can resync from the vehicle list endpoint.
#[derive(Debug, Clone)]
pub struct BroadcastRenderer {
    events: broadcast::Sender<MarkerEvent>,
    next_handle: Arc<AtomicU64>,
}

impl BroadcastRenderer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarkerEvent> {
        self.events.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<MarkerEvent> {
        self.events.clone()
    }
}

impl Default for BroadcastRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for BroadcastRenderer {
    fn create_marker(&self, position: LatLon, info: &MarkerInfo) -> MarkerHandle {
        let marker = self.next_handle.fetch_add(1, Ordering::Relaxed);
        // send only fails with no subscribers, which is fine
        let _ = self.events.send(MarkerEvent::Add {
            marker,
            position,
            info: info.clone(),
        });
        marker
    }

    fn update_marker(&self, marker: MarkerHandle, from: LatLon, to: LatLon, info: &MarkerInfo) {
        let _ = self.events.send(MarkerEvent::Move {
            marker,
            from,
            to,
            info: info.clone(),
        });
    }

    fn remove_marker(&self, marker: MarkerHandle) {
        let _ = self.events.send(MarkerEvent::Remove { marker });
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> MarkerInfo {
        MarkerInfo {
            trip_id: "AB12".to_string(),
            route: "C1".to_string(),
            destination: "Gandia".to_string(),
            platform: "2".to_string(),
            delay_seconds: 0,
        }
    }

    #[test]
    fn handles_are_unique_and_nonzero() {
        let renderer = BroadcastRenderer::new();
        let position = LatLon { lat: 39.47, lon: -0.38 };
        let a = renderer.create_marker(position, &info());
        let b = renderer.create_marker(position, &info());
        assert_ne!(a, 0);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let renderer = BroadcastRenderer::new();
        let mut rx = renderer.subscribe();
        let position = LatLon { lat: 39.47, lon: -0.38 };
        let marker = renderer.create_marker(position, &info());
        renderer.remove_marker(marker);

        assert!(matches!(rx.recv().await.unwrap(), MarkerEvent::Add { .. }));
        match rx.recv().await.unwrap() {
            MarkerEvent::Remove { marker: removed } => assert_eq!(removed, marker),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = MarkerEvent::Remove { marker: 7 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "remove");
        assert_eq!(json["marker"], 7);
    }
}
