//! Claim lookup by dot path (`realm_access.roles`).
use serde_json::Value;

/// Finds a claim. A literal key containing dots wins over nested traversal,
/// so namespaced claims like `https://example.com/groups` keep working.
pub fn lookup<'a>(claims: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    if let Some(v) = claims.get(path) {
        return Some(v);
    }
    path.split('.').try_fold(claims, |current, part| current.get(part))
}

pub fn string_claim(claims: &Value, path: &str) -> Option<String> {
    lookup(claims, path)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// A single string or an array of strings; other array items are ignored.
pub fn string_list_claim(claims: &Value, path: &str) -> Vec<String> {
    match lookup(claims, path) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_paths() {
        let c = json!({ "realm_access": { "roles": ["a", "b"] }, "user": { "name": "x" } });
        assert_eq!(string_claim(&c, "user.name").as_deref(), Some("x"));
        assert_eq!(string_list_claim(&c, "realm_access.roles"), vec!["a", "b"]);
        assert_eq!(string_claim(&c, "user.missing"), None);
        assert_eq!(string_claim(&c, "user"), None);
    }

    #[test]
    fn groups_as_string_or_mixed_array() {
        let c = json!({ "groups": "admins", "mixed": ["a", 1, null, "b"] });
        assert_eq!(string_list_claim(&c, "groups"), vec!["admins"]);
        assert_eq!(string_list_claim(&c, "mixed"), vec!["a", "b"]);
        assert!(string_list_claim(&c, "absent").is_empty());
    }

    #[test]
    fn literal_dotted_key() {
        let c = json!({ "https://example.com/groups": ["ops"] });
        assert_eq!(string_list_claim(&c, "https://example.com/groups"), vec!["ops"]);
    }
}
