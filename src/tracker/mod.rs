pub mod geofence;
pub mod motion;
pub mod normalize;
pub mod platform;
pub mod render;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::BoundingBox;
use crate::providers::gtfs::feed::FeedEntity;
use crate::providers::gtfs::ReferenceCatalog;

use motion::LatLon;
use normalize::normalize_trip_id;
use platform::platform_from_label;
use render::{MarkerHandle, MarkerInfo, Renderer};

/// Live state for one trip currently on the map.
#[derive(Debug, Clone)]
pub struct VehicleRecord {
    /// Normalized trip identifier, same as the map key.
    pub trip_id: String,
    pub position: LatLon,
    /// Fix from the previous cycle, None until the second sighting.
    pub previous_position: Option<LatLon>,
    pub delay_seconds: i32,
    pub route: String,
    pub destination: String,
    pub platform: String,
    pub current_stop_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub marker: MarkerHandle,
}

impl VehicleRecord {
    pub fn marker_info(&self) -> MarkerInfo {
        MarkerInfo {
            trip_id: self.trip_id.clone(),
            route: self.route.clone(),
            destination: self.destination.clone(),
            platform: self.platform.clone(),
            delay_seconds: self.delay_seconds,
        }
    }
}

/// Reconciles feed snapshots against the set of live vehicles. Each
/// vehicle-position snapshot is authoritative: trips it does not
/// mention are evicted immediately.
pub struct Tracker<R: Renderer> {
    bbox: BoundingBox,
    renderer: R,
    vehicles: HashMap<String, VehicleRecord>,
}

impl<R: Renderer> Tracker<R> {
    pub fn new(bbox: BoundingBox, renderer: R) -> Self {
        Self {
            bbox,
            renderer,
            vehicles: HashMap::new(),
        }
    }

    pub fn vehicles(&self) -> &HashMap<String, VehicleRecord> {
        &self.vehicles
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Applies a trip-updates document. Delay is the only field these
    /// entities may touch, and only on trips that already exist. They
    /// never create or remove records.
    pub fn apply_trip_updates(&mut self, entities: &[FeedEntity]) {
        for entity in entities {
            let Some(update) = &entity.trip_update else {
                continue;
            };
            let Some(raw_id) = update.trip.as_ref().and_then(|t| t.trip_id.as_deref()) else {
                continue;
            };
            let trip_id = normalize_trip_id(raw_id);
            if let Some(record) = self.vehicles.get_mut(&trip_id) {
                record.delay_seconds = update.delay.unwrap_or(0);
            }
        }
    }

    /// Applies a vehicle-positions document. Admitted entities create
    /// or update records, everything else is dropped without touching
    /// state, and records absent from the snapshot are evicted.
    pub fn apply_vehicle_positions(
        &mut self,
        catalog: &ReferenceCatalog,
        entities: &[FeedEntity],
    ) {
        let mut seen: HashSet<String> = HashSet::with_capacity(entities.len());

        for entity in entities {
            let Some(vehicle) = &entity.vehicle else {
                continue;
            };
            let Some(position) = vehicle.position else {
                continue;
            };
            let Some(raw_id) = vehicle.trip.as_ref().and_then(|t| t.trip_id.as_deref()) else {
                continue;
            };
            let trip_id = normalize_trip_id(raw_id);
            if trip_id.is_empty() {
                continue;
            }
            if !geofence::in_region(&self.bbox, position.latitude, position.longitude) {
                continue;
            }
            // the catalog join is the main admission filter, it is
            // what keeps other operators' trips off the map
            let Some(trip) = catalog.trips.get(&trip_id) else {
                continue;
            };

            let fix = LatLon {
                lat: position.latitude,
                lon: position.longitude,
            };
            let platform =
                platform_from_label(vehicle.vehicle.as_ref().and_then(|v| v.label.as_deref()));
            let current_stop_id = vehicle
                .stop_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            seen.insert(trip_id.clone());
            match self.vehicles.entry(trip_id.clone()) {
                Entry::Vacant(slot) => {
                    let record = VehicleRecord {
                        trip_id,
                        position: fix,
                        previous_position: None,
                        delay_seconds: 0,
                        route: catalog.route_label(&trip.route_id),
                        destination: trip.headsign.clone(),
                        platform,
                        current_stop_id,
                        updated_at: Utc::now(),
                        marker: 0,
                    };
                    let marker = self.renderer.create_marker(fix, &record.marker_info());
                    slot.insert(VehicleRecord { marker, ..record });
                }
                Entry::Occupied(mut slot) => {
                    let record = slot.get_mut();
                    let from = record.position;
                    record.previous_position = Some(from);
                    record.position = fix;
                    record.platform = platform;
                    record.current_stop_id = current_stop_id;
                    record.updated_at = Utc::now();
                    let info = record.marker_info();
                    self.renderer.update_marker(record.marker, from, fix, &info);
                }
            }
        }

        let stale: Vec<String> = self
            .vehicles
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        for key in &stale {
            if let Some(record) = self.vehicles.remove(key) {
                self.renderer.remove_marker(record.marker);
            }
        }
        debug!(
            active = self.vehicles.len(),
            evicted = stale.len(),
            "Reconciled vehicle snapshot"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::render::testing::{RecordedCall, RecordingRenderer};
    use super::*;
    use crate::providers::gtfs::catalog::{TripInfo, UNKNOWN_ROUTE};
    use crate::providers::gtfs::feed::{
        Position, TripDescriptor, TripUpdate, VehicleDescriptor, VehiclePosition,
    };

    fn make_catalog() -> ReferenceCatalog {
        let mut catalog = ReferenceCatalog::default();
        catalog.routes.insert("R1".to_string(), "C1".to_string());
        catalog.trips.insert(
            "AB12".to_string(),
            TripInfo {
                route_id: "R1".to_string(),
                headsign: "Gandia".to_string(),
            },
        );
        catalog.trips.insert(
            "CD34".to_string(),
            TripInfo {
                route_id: "R9".to_string(),
                headsign: "Moixent".to_string(),
            },
        );
        catalog.stops.insert("S1".to_string(), "Silla".to_string());
        catalog
    }

    fn bbox() -> BoundingBox {
        BoundingBox {
            south: 37.95,
            west: -1.80,
            north: 40.80,
            east: 0.70,
        }
    }

    fn vehicle_entity(trip_id: &str, lat: f64, lon: f64, label: Option<&str>) -> FeedEntity {
        FeedEntity {
            trip_update: None,
            vehicle: Some(VehiclePosition {
                trip: Some(TripDescriptor {
                    trip_id: Some(trip_id.to_string()),
                }),
                position: Some(Position {
                    latitude: lat,
                    longitude: lon,
                }),
                stop_id: Some("S1".to_string()),
                vehicle: label.map(|l| VehicleDescriptor {
                    label: Some(l.to_string()),
                }),
            }),
        }
    }

    fn trip_update_entity(trip_id: &str, delay: Option<i32>) -> FeedEntity {
        FeedEntity {
            trip_update: Some(TripUpdate {
                trip: Some(TripDescriptor {
                    trip_id: Some(trip_id.to_string()),
                }),
                delay,
            }),
            vehicle: None,
        }
    }

    fn make_tracker() -> Tracker<RecordingRenderer> {
        Tracker::new(bbox(), RecordingRenderer::default())
    }

    #[test]
    fn admitted_entity_creates_a_record_under_the_normalized_key() {
        let mut tracker = make_tracker();
        tracker.apply_vehicle_positions(
            &make_catalog(),
            &[vehicle_entity("ab-12", 39.47, -0.38, Some("C1-23562-PLATF.(3)"))],
        );

        assert_eq!(tracker.len(), 1);
        let record = &tracker.vehicles()["AB12"];
        assert_eq!(record.route, "C1");
        assert_eq!(record.destination, "Gandia");
        assert_eq!(record.platform, "3");
        assert_eq!(record.delay_seconds, 0);
        assert_eq!(record.current_stop_id.as_deref(), Some("S1"));
        assert!(record.previous_position.is_none());
        assert!(matches!(
            tracker.renderer.calls()[0],
            RecordedCall::Create(_, _, _)
        ));
    }

    #[test]
    fn update_snapshots_the_previous_position() {
        let mut tracker = make_tracker();
        let catalog = make_catalog();
        tracker.apply_vehicle_positions(&catalog, &[vehicle_entity("AB12", 39.47, -0.38, None)]);
        tracker.apply_vehicle_positions(&catalog, &[vehicle_entity("AB12", 39.48, -0.37, None)]);

        let record = &tracker.vehicles()["AB12"];
        assert_eq!(record.position, LatLon { lat: 39.48, lon: -0.37 });
        assert_eq!(
            record.previous_position,
            Some(LatLon { lat: 39.47, lon: -0.38 })
        );
        assert!(matches!(
            tracker.renderer.calls()[1],
            RecordedCall::Update(_, _, _, _)
        ));
    }

    #[test]
    fn absent_trips_are_evicted_and_destroyed_exactly_once() {
        let mut tracker = make_tracker();
        let catalog = make_catalog();
        tracker.apply_vehicle_positions(
            &catalog,
            &[
                vehicle_entity("AB12", 39.47, -0.38, None),
                vehicle_entity("CD34", 39.50, -0.40, None),
            ],
        );
        assert_eq!(tracker.len(), 2);
        let evicted_marker = tracker.vehicles()["CD34"].marker;

        tracker.apply_vehicle_positions(&catalog, &[vehicle_entity("AB12", 39.48, -0.38, None)]);
        assert_eq!(tracker.len(), 1);
        assert!(!tracker.vehicles().contains_key("CD34"));
        assert_eq!(tracker.renderer.removed_handles(), vec![evicted_marker]);

        // the evicted trip stays gone on later cycles
        tracker.apply_vehicle_positions(&catalog, &[vehicle_entity("AB12", 39.49, -0.38, None)]);
        assert_eq!(tracker.renderer.removed_handles().len(), 1);
    }

    #[test]
    fn empty_snapshot_evicts_everything() {
        let mut tracker = make_tracker();
        let catalog = make_catalog();
        tracker.apply_vehicle_positions(&catalog, &[vehicle_entity("AB12", 39.47, -0.38, None)]);
        tracker.apply_vehicle_positions(&catalog, &[]);
        assert!(tracker.is_empty());
        assert_eq!(tracker.renderer.removed_handles().len(), 1);
    }

    #[test]
    fn trip_updates_never_create_records() {
        let mut tracker = make_tracker();
        tracker.apply_trip_updates(&[trip_update_entity("AB12", Some(300))]);
        assert!(tracker.is_empty());
        assert!(tracker.renderer.calls().is_empty());
    }

    #[test]
    fn trip_updates_set_delay_on_existing_records() {
        let mut tracker = make_tracker();
        let catalog = make_catalog();
        tracker.apply_vehicle_positions(&catalog, &[vehicle_entity("AB12", 39.47, -0.38, None)]);

        tracker.apply_trip_updates(&[trip_update_entity("ab-12", Some(300))]);
        assert_eq!(tracker.vehicles()["AB12"].delay_seconds, 300);

        // an absent delay means on time
        tracker.apply_trip_updates(&[trip_update_entity("AB12", None)]);
        assert_eq!(tracker.vehicles()["AB12"].delay_seconds, 0);
    }

    #[test]
    fn out_of_region_fixes_are_dropped_silently() {
        let mut tracker = make_tracker();
        let catalog = make_catalog();
        tracker.apply_vehicle_positions(&catalog, &[vehicle_entity("AB12", 41.39, 2.17, None)]);
        assert!(tracker.is_empty());
        assert!(tracker.renderer.calls().is_empty());
    }

    #[test]
    fn trips_unknown_to_the_catalog_are_dropped_silently() {
        let mut tracker = make_tracker();
        tracker.apply_vehicle_positions(
            &make_catalog(),
            &[vehicle_entity("ZZ99", 39.47, -0.38, None)],
        );
        assert!(tracker.is_empty());
    }

    #[test]
    fn malformed_entities_are_skipped() {
        let mut tracker = make_tracker();
        let catalog = make_catalog();
        let no_position = FeedEntity {
            vehicle: Some(VehiclePosition {
                trip: Some(TripDescriptor {
                    trip_id: Some("AB12".to_string()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let no_trip = FeedEntity {
            vehicle: Some(VehiclePosition {
                position: Some(Position {
                    latitude: 39.47,
                    longitude: -0.38,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        tracker.apply_vehicle_positions(&catalog, &[no_position, no_trip, FeedEntity::default()]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn malformed_entity_does_not_shield_a_record_from_eviction() {
        let mut tracker = make_tracker();
        let catalog = make_catalog();
        tracker.apply_vehicle_positions(&catalog, &[vehicle_entity("AB12", 39.47, -0.38, None)]);

        // same trip reappears without a position, it does not count as seen
        let no_position = FeedEntity {
            vehicle: Some(VehiclePosition {
                trip: Some(TripDescriptor {
                    trip_id: Some("AB12".to_string()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        tracker.apply_vehicle_positions(&catalog, &[no_position]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn unknown_route_reference_falls_back() {
        let mut tracker = make_tracker();
        tracker.apply_vehicle_positions(
            &make_catalog(),
            &[vehicle_entity("CD34", 39.47, -0.38, None)],
        );
        assert_eq!(tracker.vehicles()["CD34"].route, UNKNOWN_ROUTE);
    }

    #[test]
    fn platform_resets_when_the_label_disappears() {
        let mut tracker = make_tracker();
        let catalog = make_catalog();
        tracker.apply_vehicle_positions(
            &catalog,
            &[vehicle_entity("AB12", 39.47, -0.38, Some("PLATF.(2)"))],
        );
        assert_eq!(tracker.vehicles()["AB12"].platform, "2");

        tracker.apply_vehicle_positions(&catalog, &[vehicle_entity("AB12", 39.48, -0.38, None)]);
        assert_eq!(tracker.vehicles()["AB12"].platform, platform::NO_PLATFORM);
    }
}
