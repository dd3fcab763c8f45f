use axum::http::StatusCode;

/// Unknown paths under `/elastauth/` are never authenticated or proxied.
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
