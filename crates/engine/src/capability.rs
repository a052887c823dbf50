// Role-based capability resolution.
//
// A single choke point consulted by the synchronizer and change tracker
// before any mutating call, instead of ad hoc checks scattered across
// call sites.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coscribe_common::types::Role;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EngineError;

/// Resolves a caller's role within a workspace.
#[async_trait]
pub trait CapabilityResolver: Send + Sync {
    /// Returns the caller's role, or `None` if the user is not a member.
    async fn role_for(&self, workspace_id: Uuid, user_id: Uuid) -> Result<Option<Role>, EngineError>;
}

/// Requires read capability (any role). A missing membership maps to
/// `NotFound` so document existence is not leaked to outsiders.
pub(crate) async fn require_read(
    capabilities: &dyn CapabilityResolver,
    workspace_id: Uuid,
    user_id: Uuid,
    doc_id: Uuid,
) -> Result<Role, EngineError> {
    capabilities
        .role_for(workspace_id, user_id)
        .await?
        .ok_or(EngineError::NotFound { doc_id })
}

/// Requires at least `required` for a mutating call.
pub(crate) async fn require_write(
    capabilities: &dyn CapabilityResolver,
    workspace_id: Uuid,
    user_id: Uuid,
    required: Role,
) -> Result<Role, EngineError> {
    let role = capabilities
        .role_for(workspace_id, user_id)
        .await?
        .ok_or(EngineError::PermissionDenied { required })?;
    if !role.allows(required) {
        return Err(EngineError::PermissionDenied { required });
    }
    Ok(role)
}

/// In-memory workspace membership store.
#[derive(Debug, Clone, Default)]
pub struct MembershipStore {
    state: Arc<RwLock<HashMap<(Uuid, Uuid), Role>>>,
}

impl MembershipStore {
    pub async fn grant(&self, workspace_id: Uuid, user_id: Uuid, role: Role) {
        self.state.write().await.insert((workspace_id, user_id), role);
    }

    pub async fn revoke(&self, workspace_id: Uuid, user_id: Uuid) {
        self.state.write().await.remove(&(workspace_id, user_id));
    }

    /// Whether the workspace has any members at all (bootstrap check).
    pub async fn has_members(&self, workspace_id: Uuid) -> bool {
        self.state.read().await.keys().any(|(ws, _)| *ws == workspace_id)
    }
}

#[async_trait]
impl CapabilityResolver for MembershipStore {
    async fn role_for(&self, workspace_id: Uuid, user_id: Uuid) -> Result<Option<Role>, EngineError> {
        Ok(self.state.read().await.get(&(workspace_id, user_id)).copied())
    }
}
