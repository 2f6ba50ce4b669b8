//! Error types for web handlers.
//!
//! Every failure other than a sold-out seat is answered with an opaque HTML
//! page. The underlying error is logged, never rendered.

use crate::pages;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use boxoffice_core::BackingStoreError;
use boxoffice_runtime::EngineError;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Html<String>, AppError> {
///     let orders = state.store.export_orders().await?;
///     Ok(Html(render(&orders)))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// What went wrong, for the log
    message: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String) -> Self {
        Self {
            status,
            message,
            source: None,
        }
    }

    /// Attach the error that caused this one.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{resource} {id} not found"))
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message.into())
    }

    /// HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                );
            } else {
                tracing::error!(status = %self.status, message = %self.message, "Request failed");
            }
        } else {
            tracing::debug!(status = %self.status, message = %self.message, "Request rejected");
        }

        let body = if self.status == StatusCode::NOT_FOUND {
            pages::not_found()
        } else {
            pages::failure()
        };

        (self.status, Html(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self::internal("Engine reload failed").with_source(err.into())
    }
}

impl From<BackingStoreError> for AppError {
    fn from(err: BackingStoreError) -> Self {
        let base = match err {
            BackingStoreError::Unavailable(_) => Self::unavailable("Backing store unavailable"),
            BackingStoreError::Database(_) | BackingStoreError::InvalidData(_) => {
                Self::internal("Backing store query failed")
            }
        };
        base.with_source(err.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}
