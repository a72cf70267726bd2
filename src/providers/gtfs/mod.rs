pub mod catalog;
pub mod error;
pub mod feed;

pub use catalog::{fetch_catalog, ReferenceCatalog};
pub use error::GtfsError;
pub use feed::{fetch_feed, FeedDocument, FeedEntity};
