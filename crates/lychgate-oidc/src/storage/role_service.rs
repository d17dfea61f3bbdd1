//! Role-assignment service trait.
//!
//! The host application owns roles and their assignments. The login flow
//! asks for the current picture, computes a diff with
//! [`sync_roles`](crate::roles::sync_roles), and hands the diff back for
//! application. The diff is applied only after user resolution has fully
//! succeeded, so a failed login never partially changes assignments.

use async_trait::async_trait;

use super::StoreError;
use crate::roles::{LocalRole, RoleDiff};

/// The host application's role-assignment service.
#[async_trait]
pub trait RoleAssignments: Send + Sync {
    /// Returns every local role together with whether it is currently
    /// assigned to the user by this integration.
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails.
    async fn local_roles(&self, user_id: &str) -> Result<Vec<LocalRole>, StoreError>;

    /// Applies a computed diff for the user.
    ///
    /// Assignments are expected to be idempotent: assigning an
    /// already-assigned role or unassigning a role this integration never
    /// assigned must not error.
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails; the caller surfaces this as
    /// a login failure.
    async fn apply(&self, user_id: &str, diff: &RoleDiff) -> Result<(), StoreError>;
}
