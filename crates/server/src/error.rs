use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use omnibase_catalog::import::ImportError;
use omnibase_core::error::{ApiError, ErrorEnvelope};
use omnibase_history::HistoryError;
use omnibase_store::StoreError;
use omnibase_store::repo::settings::SettingsError;
use tracing::error;

use crate::ai::AiError;

/// Newtype wrapper so we can implement `IntoResponse` in this crate.
pub struct AppError(pub ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        let envelope = ErrorEnvelope::from(&self.0);
        (status, Json(envelope)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        Self(ApiError::Internal(format!("storage failure: {e}")))
    }
}

impl From<SettingsError> for AppError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::NotAString(_) => Self(ApiError::BadRequest(e.to_string())),
            SettingsError::Store(inner) => inner.into(),
        }
    }
}

impl From<HistoryError> for AppError {
    fn from(e: HistoryError) -> Self {
        Self(ApiError::Unprocessable(e.to_string()))
    }
}

impl From<ImportError> for AppError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::BudgetExhausted { .. } => Self(ApiError::BudgetExhausted(e.to_string())),
        }
    }
}

impl From<AiError> for AppError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::MissingKey(_) => Self(ApiError::BadRequest(e.to_string())),
            other => Self(ApiError::Internal(format!("completion failed: {other}"))),
        }
    }
}
