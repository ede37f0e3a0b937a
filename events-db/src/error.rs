use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("error opening the event store")]
    Connect(#[source] diesel::ConnectionError),

    #[error("error applying pending migrations")]
    Migrate(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("event store query failed")]
    Query(#[source] diesel::result::Error),

    #[error("event payload was not valid JSON")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("event store schema is not present")]
    NotInitialized,
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        StoreError::Query(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
