use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub auth_provider: &'static str,
    pub mode: &'static str,
    pub cache: Value,
    pub default_roles: Vec<String>,
    pub group_mappings: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_whitelist: Option<BTreeSet<String>>,
    pub provider_config: Value,
}
