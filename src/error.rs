/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 * - Authorization ヘッダは error response には絶対に載せない
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing principal: {0}")]
    MissingPrincipal(String),
    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),
    #[error("token invalid: {0}")]
    TokenInvalid(String),
    #[error("claim missing: {0}")]
    ClaimMissing(String),
    #[error("credential unavailable")]
    CredentialUnavailable,
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("backend timed out")]
    GatewayTimeout,
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Short machine-readable code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingPrincipal(_) => "MISSING_PRINCIPAL",
            AppError::InvalidPrincipal(_) => "INVALID_PRINCIPAL",
            AppError::TokenInvalid(_) => "TOKEN_INVALID",
            AppError::ClaimMissing(_) => "CLAIM_MISSING",
            AppError::CredentialUnavailable => "CREDENTIAL_UNAVAILABLE",
            AppError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            AppError::GatewayTimeout => "GATEWAY_TIMEOUT",
            AppError::Config(_) | AppError::Internal => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingPrincipal(_)
            | AppError::InvalidPrincipal(_)
            | AppError::ClaimMissing(_) => StatusCode::BAD_REQUEST,
            AppError::TokenInvalid(_) => StatusCode::UNAUTHORIZED,
            AppError::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::CredentialUnavailable | AppError::Config(_) | AppError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Client errors carry their detail; server-side failures stay opaque.
        let message = if status.is_client_error() {
            self.to_string()
        } else {
            match &self {
                AppError::BackendUnavailable(_) => "backend unavailable".to_string(),
                AppError::GatewayTimeout => "backend timed out".to_string(),
                AppError::CredentialUnavailable => "credential unavailable".to_string(),
                _ => "internal server error".to_string(),
            }
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}
