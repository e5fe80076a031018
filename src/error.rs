use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feishu API error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("User access token is missing or expired")]
    Unauthorized,

    #[error("Invalid course: {0}")]
    Validation(String),

    #[error("Invalid period number: {0}")]
    InvalidPeriod(u32),

    #[error("Failed to resolve course calendar: {0}")]
    CalendarResolution(String),

    #[error("Course calendar not found")]
    CalendarNotFound,

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    InternalServerError,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::InvalidPeriod(period) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Invalid period number: {}", period),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Please sign in again".to_string(),
            ),
            AppError::CalendarNotFound => (
                StatusCode::NOT_FOUND,
                "Course calendar not found".to_string(),
            ),
            AppError::CalendarResolution(msg) => {
                error!("calendar resolution failed: {}", msg);
                (StatusCode::BAD_GATEWAY, format!("Calendar sync failed: {}", msg))
            }
            AppError::Api { code, msg } => {
                error!("feishu api error {}: {}", code, msg);
                (StatusCode::BAD_GATEWAY, format!("{} (code {})", msg, code))
            }
            AppError::Http(e) => {
                error!("http error: {}", e);
                (StatusCode::BAD_GATEWAY, "Upstream request failed".to_string())
            }
            AppError::UnexpectedResponse(msg) => {
                error!("unexpected upstream response: {}", msg);
                (StatusCode::BAD_GATEWAY, "Unexpected upstream response".to_string())
            }
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::Migration(e) => {
                error!("migration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}
