use serde::Serialize;

use crate::services::roles::RoleSet;

/// Full replacement body for a backend user.
///
/// Serialized as the Elasticsearch `_security/user` payload. Every upsert sends
/// the whole account so repeated calls converge on the same state.
#[derive(Clone, Serialize)]
pub struct BackendAccount {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
    pub metadata: AccountMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub roles: RoleSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountMetadata {
    pub groups: Vec<String>,
}

impl std::fmt::Debug for BackendAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendAccount")
            .field("enabled", &self.enabled)
            .field("email", &self.email)
            .field("password", &"***")
            .field("full_name", &self.full_name)
            .field("roles", &self.roles)
            .field("metadata", &self.metadata)
            .finish()
    }
}
