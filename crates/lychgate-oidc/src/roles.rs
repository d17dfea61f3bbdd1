//! Claim-to-role mapping.
//!
//! Resolves the configured role claim from a validated ID token into a
//! diff of local roles to assign and unassign. This module performs no
//! mutation itself: the caller applies the returned [`RoleDiff`] through
//! the host's [`RoleAssignments`](crate::storage::RoleAssignments)
//! service, which keeps the mapping side-effect-free and independently
//! testable.
//!
//! Group membership is a flat list of strings compared against role
//! shortnames with exact, case-sensitive matching. Nested or ID-based
//! group claims that require a directory lookup are out of scope here.

use serde::{Deserialize, Serialize};

use crate::jwt::IdToken;

/// A role known to the host application.
///
/// Roles are never created or destroyed by this crate; only their
/// assignment state is mutated, and only for assignments made by this
/// integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRole {
    /// The role's shortname, matched against claimed group names.
    pub shortname: String,

    /// Whether the current assignment (if any) was made by this
    /// integration. Assignments made elsewhere are never revoked here.
    pub assigned_by_plugin: bool,
}

impl LocalRole {
    /// Creates a role that is not currently assigned by this integration.
    #[must_use]
    pub fn new(shortname: impl Into<String>) -> Self {
        Self {
            shortname: shortname.into(),
            assigned_by_plugin: false,
        }
    }

    /// Marks the role as currently assigned by this integration.
    #[must_use]
    pub fn with_assigned_by_plugin(mut self, assigned: bool) -> Self {
        self.assigned_by_plugin = assigned;
        self
    }
}

/// The result of reconciling claimed groups against local roles.
///
/// Re-running [`sync_roles`] with identical inputs yields an identical
/// diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDiff {
    /// Shortnames of roles to assign.
    pub assign: Vec<String>,

    /// Shortnames of roles to unassign (previously assigned by this
    /// integration, no longer claimed).
    pub unassign: Vec<String>,
}

impl RoleDiff {
    /// Returns `true` when nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assign.is_empty() && self.unassign.is_empty()
    }
}

/// Computes the role diff for a validated ID token.
///
/// Reads the claim named `role_claim_name`; when it is absent or not a
/// sequence of strings the claimed-group set is treated as empty, so no
/// role matches and every plugin-assigned role is queued for removal.
#[must_use]
pub fn sync_roles(id_token: &IdToken, local_roles: &[LocalRole], role_claim_name: &str) -> RoleDiff {
    let claimed = id_token
        .claim_str_list(role_claim_name)
        .unwrap_or_default();

    let mut diff = RoleDiff::default();
    for role in local_roles {
        if claimed.contains(&role.shortname.as_str()) {
            diff.assign.push(role.shortname.clone());
        } else if role.assigned_by_plugin {
            diff.unassign.push(role.shortname.clone());
        }
    }

    tracing::debug!(
        claim = role_claim_name,
        assign = ?diff.assign,
        unassign = ?diff.unassign,
        "Computed role diff"
    );

    diff
}
