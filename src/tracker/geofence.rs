use crate::config::BoundingBox;

/// Closed-interval containment, coordinates exactly on the boundary
/// count as inside.
pub fn in_region(bbox: &BoundingBox, lat: f64, lon: f64) -> bool {
    lat >= bbox.south && lat <= bbox.north && lon >= bbox.west && lon <= bbox.east
}
