//! Helpers that keep secrets out of logs and diagnostic responses.

const SENSITIVE_KEYWORDS: &[&str] = &[
    "password",
    "secret",
    "key",
    "token",
    "credential",
    "auth",
    "bearer",
    "basic",
    "cookie",
    "session",
    "private",
    "cert",
];

pub const MASK: &str = "***";

/// True when a field or header name likely carries secret material.
pub fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Replaces values of sensitive keys (recursively) with [`MASK`].
pub fn mask_sensitive(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if is_sensitive_field(&k) && !v.is_null() {
                        (k, serde_json::Value::String(MASK.to_string()))
                    } else {
                        (k, mask_sensitive(v))
                    }
                })
                .collect(),
        ),
        other => other,
    }
}
