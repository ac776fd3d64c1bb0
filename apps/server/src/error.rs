use std::io::Error as IoError;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Configuration error: {0}")]
    Config(#[from] pulse_service::config::ConfigError),
    #[error("Service startup failed: {0}")]
    Service(#[from] pulse_service::Error),
}

/// Error returned from a route handler
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No target with id {0}")]
    TargetNotFound(Uuid),
    #[error(transparent)]
    Service(#[from] pulse_service::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::TargetNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Service(e) if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        HttpResponse::build(self.status_code()).json(ErrorBody { error: self.to_string() })
    }
}
