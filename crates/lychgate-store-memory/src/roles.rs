//! In-memory role assignments.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use lychgate_oidc::roles::{LocalRole, RoleDiff};
use lychgate_oidc::storage::{RoleAssignments, StoreError};

/// Role assignments over a fixed set of role shortnames.
///
/// Only assignments made through [`apply`](RoleAssignments::apply) are
/// tracked; they are exactly the ones reported as plugin-assigned.
#[derive(Debug, Default)]
pub struct MemoryRoleAssignments {
    defined: Vec<String>,
    assigned: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryRoleAssignments {
    /// Creates a service over the given role shortnames.
    #[must_use]
    pub fn new(roles: Vec<impl Into<String>>) -> Self {
        Self {
            defined: roles.into_iter().map(Into::into).collect(),
            assigned: RwLock::new(HashMap::new()),
        }
    }

    /// Role shortnames currently assigned to the user, sorted.
    pub async fn assigned_roles(&self, user_id: &str) -> Vec<String> {
        let assigned = self.assigned.read().await;
        let mut roles: Vec<String> = assigned
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        roles.sort();
        roles
    }
}

#[async_trait]
impl RoleAssignments for MemoryRoleAssignments {
    async fn local_roles(&self, user_id: &str) -> Result<Vec<LocalRole>, StoreError> {
        let assigned = self.assigned.read().await;
        let mine = assigned.get(user_id);

        Ok(self
            .defined
            .iter()
            .map(|shortname| {
                let held = mine.is_some_and(|set| set.contains(shortname));
                LocalRole::new(shortname).with_assigned_by_plugin(held)
            })
            .collect())
    }

    async fn apply(&self, user_id: &str, diff: &RoleDiff) -> Result<(), StoreError> {
        let mut assigned = self.assigned.write().await;
        let mine = assigned.entry(user_id.to_string()).or_default();

        for role in &diff.assign {
            mine.insert(role.clone());
        }
        for role in &diff.unassign {
            mine.remove(role);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_roles_reflect_applied_diffs() {
        let service = MemoryRoleAssignments::new(vec!["Teacher", "Student", "Manager"]);

        service
            .apply(
                "u1",
                &RoleDiff {
                    assign: vec!["Teacher".to_string()],
                    unassign: vec![],
                },
            )
            .await
            .unwrap();

        let roles = service.local_roles("u1").await.unwrap();
        assert_eq!(roles.len(), 3);
        let teacher = roles.iter().find(|r| r.shortname == "Teacher").unwrap();
        assert!(teacher.assigned_by_plugin);
        let student = roles.iter().find(|r| r.shortname == "Student").unwrap();
        assert!(!student.assigned_by_plugin);
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let service = MemoryRoleAssignments::new(vec!["Teacher"]);
        let diff = RoleDiff {
            assign: vec!["Teacher".to_string()],
            unassign: vec![],
        };

        service.apply("u1", &diff).await.unwrap();
        service.apply("u1", &diff).await.unwrap();
        assert_eq!(service.assigned_roles("u1").await, vec!["Teacher"]);

        let remove = RoleDiff {
            assign: vec![],
            unassign: vec!["Teacher".to_string(), "NeverHeld".to_string()],
        };
        service.apply("u1", &remove).await.unwrap();
        service.apply("u1", &remove).await.unwrap();
        assert!(service.assigned_roles("u1").await.is_empty());
    }
}
