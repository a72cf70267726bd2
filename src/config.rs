use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub region: RegionConfig,
    pub catalog: CatalogConfig,
    pub feeds: FeedConfig,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors_permissive: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub bounding_box: BoundingBox,
}

/// Geographic bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub routes_url: String,
    pub trips_url: String,
    pub stops_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub trip_updates_url: String,
    pub vehicle_positions_url: String,
    /// Poll period and marker animation duration. A single value keeps
    /// tweens finishing exactly when the next snapshot lands.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "feeds.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        let bb = &self.region.bounding_box;
        if bb.south > bb.north {
            return Err(ConfigError::Invalid(
                "bounding_box.south must not exceed bounding_box.north".to_string(),
            ));
        }
        if bb.west > bb.east {
            return Err(ConfigError::Invalid(
                "bounding_box.west must not exceed bounding_box.east".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
