use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self { status: "OK" }
    }

    pub fn unavailable() -> Self {
        Self {
            status: "UNAVAILABLE",
        }
    }
}
