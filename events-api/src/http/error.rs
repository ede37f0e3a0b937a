use log::error;
use miette::Diagnostic;
use rocket::Request;
use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::serde::json::Json;
use serde::Serialize;
use thiserror::Error;

use crate::chart::ChartError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Validation errors are the HTTP layer's own; anything reaching past
/// routing (store, ingestion, rendering) is reported generically per §7 —
/// never logged at error level, since the caller induced them.
#[derive(Debug, Error, Diagnostic)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, field: Option<String> },

    #[error("event store is not initialized")]
    NotInitialized,

    #[error("event store query failed")]
    Store(events_db::StoreError),

    #[error(transparent)]
    Ingest(#[from] events_ingest::IngestError),

    #[error(transparent)]
    Chart(#[from] ChartError),
}

impl From<events_db::StoreError> for ApiError {
    fn from(err: events_db::StoreError) -> Self {
        match err {
            events_db::StoreError::NotInitialized => ApiError::NotInitialized,
            other => ApiError::Store(other),
        }
    }
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation { message: message.into(), field: None }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        ApiError::Validation { message: message.into(), field: Some(field.into()) }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        match self {
            ApiError::Validation { message, field } => {
                Json(ErrorBody { error: message, field }).respond_to(request).map(|mut response| {
                    response.set_status(Status::BadRequest);
                    response.set_header(ContentType::JSON);
                    response
                })
            }
            ApiError::NotInitialized => {
                Json(ErrorBody { error: "event store is not initialized".to_string(), field: None })
                    .respond_to(request)
                    .map(|mut response| {
                        response.set_status(Status::ServiceUnavailable);
                        response.set_header(ContentType::JSON);
                        response
                    })
            }
            other => {
                error!("request failed: {other}");
                Json(ErrorBody { error: "internal error".to_string(), field: None })
                    .respond_to(request)
                    .map(|mut response| {
                        response.set_status(Status::InternalServerError);
                        response.set_header(ContentType::JSON);
                        response
                    })
            }
        }
    }
}
