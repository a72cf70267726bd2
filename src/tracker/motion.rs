use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Per-axis linear interpolation between two reported fixes. Built
/// fresh each cycle, sampled on demand by readers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTween {
    from: LatLon,
    to: LatLon,
    duration_ms: u64,
}

impl PositionTween {
    /// Without a previous fix, or when the fix has not moved, the
    /// tween degenerates to a snap that always reports the target.
    pub fn new(previous: Option<LatLon>, target: LatLon, duration_ms: u64) -> Self {
        match previous {
            Some(from) if from != target && duration_ms > 0 => Self {
                from,
                to: target,
                duration_ms,
            },
            _ => Self {
                from: target,
                to: target,
                duration_ms: 0,
            },
        }
    }

    /// Position after `elapsed_ms`, clamped to the target once the
    /// duration has passed.
    pub fn sample(&self, elapsed_ms: u64) -> LatLon {
        if self.duration_ms == 0 || elapsed_ms >= self.duration_ms {
            return self.to;
        }
        let t = elapsed_ms as f64 / self.duration_ms as f64;
        LatLon {
            lat: self.from.lat + (self.to.lat - self.from.lat) * t,
            lon: self.from.lon + (self.to.lon - self.from.lon) * t,
        }
    }

    pub fn is_snap(&self) -> bool {
        self.duration_ms == 0
    }
}
