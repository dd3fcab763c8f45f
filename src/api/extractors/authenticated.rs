/*
 * Responsibility
 * - Principal 抽出 → Credential 解決を行い、handler には Credential だけを渡す
 * - 失敗時は AppError で reject (Authorization ヘッダは付けない / backend には触れない)
 */
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::credentials::Credential;
use crate::state::AppState;

/// Resolved backend credential for the principal behind this request.
pub struct Authenticated(pub Credential);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let mode = state.mode().as_str();

        let result = async {
            let principal = state.extractor.extract(&parts.headers).await?;
            state.credentials.resolve(&principal).await
        }
        .await;

        match result {
            Ok(credential) => {
                metrics::counter!("elastauth_requests_total", "mode" => mode, "outcome" => "ok")
                    .increment(1);
                Ok(Self(credential))
            }
            Err(err) => {
                metrics::counter!("elastauth_requests_total", "mode" => mode, "outcome" => err.code())
                    .increment(1);
                if err.status().is_server_error() {
                    tracing::error!(error = %err, provider = state.extractor.name(), "authentication failed");
                } else {
                    tracing::info!(error = %err, provider = state.extractor.name(), "request rejected");
                }
                Err(err)
            }
        }
    }
}
