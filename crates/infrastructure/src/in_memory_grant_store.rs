use std::collections::HashMap;

use async_trait::async_trait;
use portwarden_application::GrantStore;
use portwarden_core::{AppError, AppResult};
use portwarden_domain::{FirewallGroup, IngressPermission, IngressRule};
use tokio::sync::RwLock;

/// In-memory firewall rule set keyed by (region, group id).
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    permissions: RwLock<HashMap<(String, String), Vec<IngressPermission>>>,
}

impl InMemoryGrantStore {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a group with pre-existing permissions, replacing what it held.
    #[cfg(test)]
    pub(crate) async fn seed(&self, group: &FirewallGroup, permissions: Vec<IngressPermission>) {
        self.permissions
            .write()
            .await
            .insert(group_key(group), permissions);
    }
}

fn group_key(group: &FirewallGroup) -> (String, String) {
    (group.region().to_owned(), group.group_id().to_owned())
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn list_permissions(&self, group: &FirewallGroup) -> AppResult<Vec<IngressPermission>> {
        Ok(self
            .permissions
            .read()
            .await
            .get(&group_key(group))
            .cloned()
            .unwrap_or_default())
    }

    async fn add(&self, rule: &IngressRule) -> AppResult<()> {
        let mut permissions = self.permissions.write().await;
        let group_permissions = permissions.entry(group_key(rule.group())).or_default();

        if group_permissions
            .iter()
            .any(|permission| rule.is_satisfied_by(permission))
        {
            return Err(AppError::Conflict(format!(
                "ingress rule '{}' already exists",
                rule.tuple_key()
            )));
        }

        group_permissions.push(rule.to_permission());
        Ok(())
    }

    async fn remove(&self, rule: &IngressRule) -> AppResult<()> {
        let mut permissions = self.permissions.write().await;
        let not_found = || {
            AppError::NotFound(format!("ingress rule '{}' does not exist", rule.tuple_key()))
        };
        let group_permissions = permissions
            .get_mut(&group_key(rule.group()))
            .ok_or_else(not_found)?;
        let position = group_permissions
            .iter()
            .position(|permission| rule.is_satisfied_by(permission))
            .ok_or_else(not_found)?;

        let host_network = rule.origin().host_network();
        let permission = &mut group_permissions[position];
        permission.ranges.retain(|range| *range != host_network);
        if permission.ranges.is_empty() {
            group_permissions.remove(position);
        }

        Ok(())
    }
}
