/*
 * Responsibility
 * - auth-only mode: 空 body + Authorization: Basic ... を返す
 * - reverse proxy / ingress がこのヘッダを backend に転送する前提
 */
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::api::extractors::Authenticated;
use crate::error::AppError;

pub async fn authenticate(Authenticated(credential): Authenticated) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(&credential.authorization_header())
        .map_err(|_| AppError::Internal)?;

    Ok((StatusCode::OK, [(header::AUTHORIZATION, value)]).into_response())
}
