use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{worker::WorkerError, AppError};

/// Standardized JSON error body.
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let body = ApiErrorResponse {
        error: ApiErrorBody {
            code: code.to_string(),
            message: message.into(),
        },
    };
    (status, Json(body)).into_response()
}

fn login_redirect(msg: &str) -> Response {
    Redirect::to(&format!("/login?error={}", urlencoding::encode(msg))).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            // Missing or rejected credentials send the browser back to login
            AppError::Auth(msg) => login_redirect(&msg),
            AppError::Token(e) => {
                tracing::debug!("Rejected access token: {}", e);
                login_redirect("Could not validate credentials")
            }

            AppError::InvalidCredentials => {
                let mut response = json_error(
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    "Incorrect username or password",
                );
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Bearer"));
                response
            }

            AppError::InactiveUser => {
                json_error(StatusCode::BAD_REQUEST, "INACTIVE_USER", "Inactive user")
            }
            AppError::UsernameTaken => json_error(
                StatusCode::BAD_REQUEST,
                "USERNAME_TAKEN",
                "Username already registered",
            ),
            AppError::Validation(msg) => {
                json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg)
            }
            AppError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", msg),

            AppError::Worker(err) => convert_worker_error(err),

            err @ (AppError::Database(_)
            | AppError::File(_)
            | AppError::Hash(_)
            | AppError::Template(_)
            | AppError::Internal(_)) => {
                tracing::error!("Request failed: {}", err);
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred.",
                )
            }
        }
    }
}

fn convert_worker_error(err: WorkerError) -> Response {
    match err {
        WorkerError::QueueClosed => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "QUEUE_CLOSED",
            "Worksheet generation is unavailable.",
        ),
        WorkerError::Timeout(seconds) => json_error(
            StatusCode::GATEWAY_TIMEOUT,
            "TIMEOUT",
            format!("Worksheet generation timed out after {} seconds", seconds),
        ),
        other => {
            tracing::error!("Worker failure surfaced to request: {}", other);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "GENERATION_FAILED",
                "Failed to generate worksheet.",
            )
        }
    }
}
