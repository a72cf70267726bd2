use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::CatalogConfig;
use crate::tracker::normalize::normalize_trip_id;

use super::error::GtfsError;

/// Shown when a trip references a route the catalog does not know.
pub const UNKNOWN_ROUTE: &str = "unknown route";
/// Shown when a trip row carries no headsign.
pub const UNKNOWN_DESTINATION: &str = "unknown destination";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct TripInfo {
    pub route_id: String,
    pub headsign: String,
}

/// Static lookup tables loaded once at startup. Trip keys are stored
/// normalized so realtime identifiers join against them directly.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    /// route_id -> display name
    pub routes: HashMap<String, String>,
    /// normalized trip_id -> trip info
    pub trips: HashMap<String, TripInfo>,
    /// stop_id -> stop name
    pub stops: HashMap<String, String>,
}

impl ReferenceCatalog {
    pub fn parse(
        routes_text: &str,
        trips_text: &str,
        stops_text: &str,
    ) -> Result<Self, GtfsError> {
        let routes = parse_routes(routes_text)?;
        let trips = parse_trips(trips_text)?;
        let stops = parse_stops(stops_text)?;
        info!(
            routes = routes.len(),
            trips = trips.len(),
            stops = stops.len(),
            "Parsed reference catalog"
        );
        Ok(Self {
            routes,
            trips,
            stops,
        })
    }

    /// Display label for a route. Labels are resolved at load time
    /// with a short name, long name, sentinel fallback chain, so a
    /// route with an empty short name still gets a usable label
    /// instead of an empty string.
    pub fn route_label(&self, route_id: &str) -> String {
        self.routes
            .get(route_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_ROUTE.to_string())
    }
}

/// The upstream export does not quote fields, so quoting is disabled
/// and commas always split.
fn csv_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .quoting(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes())
}

fn required_column(headers: &csv::StringRecord, name: &str) -> Result<usize, GtfsError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| GtfsError::CatalogParse(format!("missing required column {name}")))
}

fn parse_routes(text: &str) -> Result<HashMap<String, String>, GtfsError> {
    let mut reader = csv_reader(text);
    let headers = reader.headers()?.clone();
    let id_idx = required_column(&headers, "route_id")?;
    let short_idx = required_column(&headers, "route_short_name")?;
    let long_idx = headers.iter().position(|h| h == "route_long_name");

    let mut routes = HashMap::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let route_id = record.get(id_idx).unwrap_or("");
        if route_id.is_empty() {
            skipped += 1;
            continue;
        }
        let short_name = record.get(short_idx).unwrap_or("");
        let long_name = long_idx.and_then(|i| record.get(i)).unwrap_or("");
        let label = if !short_name.is_empty() {
            short_name
        } else if !long_name.is_empty() {
            long_name
        } else {
            UNKNOWN_ROUTE
        };
        routes.insert(route_id.to_string(), label.to_string());
    }
    if skipped > 0 {
        warn!(skipped, "Skipped route rows without a route_id");
    }
    Ok(routes)
}

fn parse_trips(text: &str) -> Result<HashMap<String, TripInfo>, GtfsError> {
    let mut reader = csv_reader(text);
    let headers = reader.headers()?.clone();
    let trip_idx = required_column(&headers, "trip_id")?;
    let route_idx = required_column(&headers, "route_id")?;
    let headsign_idx = headers.iter().position(|h| h == "trip_headsign");

    let mut trips = HashMap::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let trip_id = normalize_trip_id(record.get(trip_idx).unwrap_or(""));
        if trip_id.is_empty() {
            skipped += 1;
            continue;
        }
        let headsign = headsign_idx
            .and_then(|i| record.get(i))
            .filter(|h| !h.is_empty())
            .unwrap_or(UNKNOWN_DESTINATION);
        trips.insert(
            trip_id,
            TripInfo {
                route_id: record.get(route_idx).unwrap_or("").to_string(),
                headsign: headsign.to_string(),
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped trip rows without a usable trip_id");
    }
    Ok(trips)
}

fn parse_stops(text: &str) -> Result<HashMap<String, String>, GtfsError> {
    let mut reader = csv_reader(text);
    let headers = reader.headers()?.clone();
    let id_idx = required_column(&headers, "stop_id")?;
    let name_idx = required_column(&headers, "stop_name")?;

    let mut stops = HashMap::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let stop_id = record.get(id_idx).unwrap_or("");
        if stop_id.is_empty() {
            skipped += 1;
            continue;
        }
        stops.insert(
            stop_id.to_string(),
            record.get(name_idx).unwrap_or("").to_string(),
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stop rows without a stop_id");
    }
    Ok(stops)
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, GtfsError> {
    let response = client.get(url).timeout(FETCH_TIMEOUT).send().await?;
    if !response.status().is_success() {
        return Err(GtfsError::FeedRejected(format!(
            "{url} returned status {}",
            response.status()
        )));
    }
    Ok(response.text().await?)
}

/// Fetches and parses the three catalog files. Any failure here is
/// fatal for the caller, a tracker without a catalog cannot admit
/// vehicles.
pub async fn fetch_catalog(
    client: &reqwest::Client,
    config: &CatalogConfig,
) -> Result<ReferenceCatalog, GtfsError> {
    let (routes, trips, stops) = futures::try_join!(
        fetch_text(client, &config.routes_url),
        fetch_text(client, &config.trips_url),
        fetch_text(client, &config.stops_url),
    )?;
    ReferenceCatalog::parse(&routes, &trips, &stops)
}
