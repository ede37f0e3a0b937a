mod config;
mod engine;

pub use config::IngestConfig;
pub use engine::{Engine, EndpointKey, IngestError, SharedEngine};
