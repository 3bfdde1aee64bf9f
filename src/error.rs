//! Error taxonomy shared by the engine, the HTTP routes and the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorBody;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("Total discount {discount} exceeds the base total {base}")]
    DiscountExceedsBase { discount: Decimal, base: Decimal },

    #[error("{count} additional service(s) totalling {unpaid} are still unpaid; confirm to complete the job")]
    ConfirmationRequired { count: usize, unpaid: Decimal },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    /// A non-2xx answer from the job-records API, message kept verbatim.
    #[error("{message}")]
    Remote { status: u16, message: String },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) | EngineError::DiscountExceedsBase { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::ConfirmationRequired { .. } => StatusCode::PRECONDITION_REQUIRED,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::Conflict(_) | EngineError::Inventory(_) => StatusCode::CONFLICT,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Transport(_) => StatusCode::BAD_GATEWAY,
            EngineError::Remote { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Storage(anyhow::Error::new(err))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Transport(err.to_string())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            EngineError::Storage(err) => {
                error!("Storage failure: {:#}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}
