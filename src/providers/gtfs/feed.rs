use std::time::Duration;

use serde::Deserialize;

use super::error::GtfsError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 50 * 1024 * 1024;

/// One realtime feed document. Both feeds share this shape, entities
/// simply populate different branches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDocument {
    #[serde(default)]
    pub entity: Vec<FeedEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntity {
    #[serde(default)]
    pub trip_update: Option<TripUpdate>,
    #[serde(default)]
    pub vehicle: Option<VehiclePosition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripUpdate {
    #[serde(default)]
    pub trip: Option<TripDescriptor>,
    /// Seconds behind schedule, negative when running early.
    #[serde(default)]
    pub delay: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePosition {
    #[serde(default)]
    pub trip: Option<TripDescriptor>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub stop_id: Option<String>,
    #[serde(default)]
    pub vehicle: Option<VehicleDescriptor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDescriptor {
    #[serde(default)]
    pub trip_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleDescriptor {
    #[serde(default)]
    pub label: Option<String>,
}

pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<FeedDocument, GtfsError> {
    let response = client.get(url).timeout(FETCH_TIMEOUT).send().await?;
    if !response.status().is_success() {
        return Err(GtfsError::FeedRejected(format!(
            "{url} returned status {}",
            response.status()
        )));
    }
    if let Some(length) = response.content_length() {
        if length as usize > MAX_FEED_SIZE {
            return Err(GtfsError::FeedRejected(format!(
                "{url} advertised {length} bytes, limit is {MAX_FEED_SIZE}"
            )));
        }
    }
    let bytes = response.bytes().await?;
    if bytes.len() > MAX_FEED_SIZE {
        return Err(GtfsError::FeedRejected(format!(
            "{url} returned {} bytes, limit is {MAX_FEED_SIZE}",
            bytes.len()
        )));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_vehicle_position_entities() {
        let json = r#"{
            "header": {"timestamp": "1700000000"},
            "entity": [{
                "id": "1",
                "vehicle": {
                    "trip": {"tripId": "ab-12"},
                    "position": {"latitude": 39.47, "longitude": -0.38},
                    "stopId": "S1",
                    "vehicle": {"label": "C1-23562-PLATF.(2)"}
                }
            }]
        }"#;
        let doc: FeedDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.entity.len(), 1);
        let vehicle = doc.entity[0].vehicle.as_ref().unwrap();
        assert_eq!(vehicle.trip.as_ref().unwrap().trip_id.as_deref(), Some("ab-12"));
        assert_eq!(vehicle.position.unwrap().latitude, 39.47);
        assert_eq!(vehicle.stop_id.as_deref(), Some("S1"));
    }

    #[test]
    fn decodes_trip_update_entities() {
        let json = r#"{
            "entity": [{
                "id": "2",
                "tripUpdate": {"trip": {"tripId": "cd34"}, "delay": 120}
            }]
        }"#;
        let doc: FeedDocument = serde_json::from_str(json).unwrap();
        let update = doc.entity[0].trip_update.as_ref().unwrap();
        assert_eq!(update.delay, Some(120));
    }

    #[test]
    fn missing_fields_are_tolerated() {
        let doc: FeedDocument = serde_json::from_str(r#"{"entity": [{}, {"vehicle": {}}]}"#).unwrap();
        assert_eq!(doc.entity.len(), 2);
        assert!(doc.entity[1].vehicle.as_ref().unwrap().position.is_none());
    }

    #[test]
    fn empty_document_decodes() {
        let doc: FeedDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.entity.is_empty());
    }

    #[test]
    fn unmodeled_wire_fields_are_ignored() {
        // entity ids and the feed header are present on the wire but
        // nothing downstream consumes them
        let json = r#"{
            "header": {"gtfsRealtimeVersion": "2.0", "timestamp": "1700000000"},
            "entity": [{"id": "42", "isDeleted": false, "vehicle": {"stopId": "S1"}}]
        }"#;
        let doc: FeedDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.entity.len(), 1);
        assert_eq!(
            doc.entity[0].vehicle.as_ref().unwrap().stop_id.as_deref(),
            Some("S1")
        );
    }
}
