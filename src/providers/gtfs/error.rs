use thiserror::Error;

#[derive(Debug, Error)]
pub enum GtfsError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Feed rejected: {0}")]
    FeedRejected(String),

    #[error("Catalog parse error: {0}")]
    CatalogParse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
