/*
 * Responsibility
 * - proxy mode: 認証済みリクエストを backend に転送し、応答をそのまま返す
 */
use axum::{
    body::Body,
    extract::{Request, State},
    http::Response,
};

use crate::api::extractors::Authenticated;
use crate::error::AppError;
use crate::state::AppState;

pub async fn proxy(
    State(state): State<AppState>,
    Authenticated(credential): Authenticated,
    req: Request,
) -> Result<Response<Body>, AppError> {
    let Some(forwarder) = state.forwarder.as_ref() else {
        tracing::error!("proxy handler mounted without a forwarder");
        return Err(AppError::Internal);
    };

    forwarder.forward(req, &credential).await
}
