mod error;
mod migrations;
mod models;
mod schema;

pub mod event_type;
pub mod repository;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use event_type::{EventType, RecognizedSet, EXTENDED_EVENT_TYPES, MINIMUM_EVENT_TYPES};
pub use repository::{
    ActivitySummary, IntervalStats, PrDayCounts, PrIntervalStats, Repository, TimeseriesBucket,
    TrendingEntry,
};
pub use store::{Event, Store};
