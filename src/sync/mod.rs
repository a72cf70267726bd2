use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::providers::gtfs::{fetch_catalog, fetch_feed, FeedDocument, GtfsError, ReferenceCatalog};
use crate::tracker::render::BroadcastRenderer;
use crate::tracker::Tracker;

pub type CatalogStore = Arc<RwLock<Option<ReferenceCatalog>>>;
pub type TrackerStore = Arc<RwLock<Tracker<BroadcastRenderer>>>;

/// Owns the periodic fetch cycle. The catalog is loaded once before
/// polling starts, each cycle then pulls both realtime feeds and
/// reconciles them into the shared tracker.
pub struct SyncManager {
    client: reqwest::Client,
    config: Config,
    catalog: CatalogStore,
    tracker: TrackerStore,
}

impl SyncManager {
    pub fn new(config: Config, renderer: BroadcastRenderer) -> Result<Self, GtfsError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("railtrace/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let tracker = Tracker::new(config.region.bounding_box, renderer);
        Ok(Self {
            client,
            config,
            catalog: Arc::new(RwLock::new(None)),
            tracker: Arc::new(RwLock::new(tracker)),
        })
    }

    pub fn catalog_store(&self) -> CatalogStore {
        Arc::clone(&self.catalog)
    }

    pub fn tracker_store(&self) -> TrackerStore {
        Arc::clone(&self.tracker)
    }

    /// Fetches and installs the reference catalog. Callers treat a
    /// failure here as fatal, without the catalog no vehicle can ever
    /// be admitted.
    pub async fn load_catalog(&self) -> Result<(), GtfsError> {
        let catalog = fetch_catalog(&self.client, &self.config.catalog).await?;
        info!(
            region = %self.config.region.name,
            trips = catalog.trips.len(),
            "Reference catalog loaded"
        );
        *self.catalog.write().await = Some(catalog);
        Ok(())
    }

    pub async fn start(self: Arc<Self>) {
        let period = Duration::from_millis(self.config.feeds.poll_interval_ms);
        info!(period_ms = period.as_millis() as u64, "Starting feed polling");
        let mut interval = tokio::time::interval(period);
        loop {
            // the first tick completes immediately
            interval.tick().await;
            self.run_cycle().await;
        }
    }

    /// One poll cycle. The two feeds fail independently, a bad cycle
    /// is logged and skipped without touching the previous state.
    async fn run_cycle(&self) {
        if self.catalog.read().await.is_none() {
            debug!("Reference catalog not loaded, skipping cycle");
            return;
        }

        let (trip_updates, vehicle_positions) = tokio::join!(
            fetch_feed(&self.client, &self.config.feeds.trip_updates_url),
            fetch_feed(&self.client, &self.config.feeds.vehicle_positions_url),
        );
        self.apply_feed_results(trip_updates, vehicle_positions).await;
    }

    /// Reconciles whatever the cycle managed to fetch. Either feed may
    /// have failed, the other still applies.
    async fn apply_feed_results(
        &self,
        trip_updates: Result<FeedDocument, GtfsError>,
        vehicle_positions: Result<FeedDocument, GtfsError>,
    ) {
        let catalog_guard = self.catalog.read().await;
        let Some(catalog) = catalog_guard.as_ref() else {
            return;
        };
        let mut tracker = self.tracker.write().await;

        // trip updates apply before the position snapshot, so a delay
        // only ever lands on a vehicle admitted in an earlier cycle
        match trip_updates {
            Ok(doc) => tracker.apply_trip_updates(&doc.entity),
            Err(err) => warn!(error = %err, "Trip updates fetch failed"),
        }
        match vehicle_positions {
            Ok(doc) => tracker.apply_vehicle_positions(catalog, &doc.entity),
            Err(err) => {
                warn!(error = %err, "Vehicle positions fetch failed");
                return;
            }
        }

        debug!(active = tracker.len(), "Poll cycle complete");
    }
}

/// Loads the catalog, then hands the manager to a background task.
/// A catalog failure aborts startup.
pub async fn spawn(manager: SyncManager) -> Result<Arc<SyncManager>, GtfsError> {
    if let Err(err) = manager.load_catalog().await {
        error!(error = %err, "Failed to load reference catalog");
        return Err(err);
    }
    let manager = Arc::new(manager);
    tokio::spawn(Arc::clone(&manager).start());
    Ok(manager)
}
