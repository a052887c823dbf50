// Tracked-changes workflow over the baseline/current content pair.
//
// The diff is derived on demand and never persisted; accept promotes the
// working content to the new baseline, reject rolls the working content
// back and propagates the rollback as an ordinary synchronizer write so
// every open session observes it.

use std::sync::Arc;

use coscribe_common::diff::{line_diff, DiffResult};
use coscribe_common::types::Role;
use uuid::Uuid;

use crate::capability::{require_read, require_write, CapabilityResolver};
use crate::error::EngineError;
use crate::store::DocumentBackend;
use crate::sync::{DocSynchronizer, WriteAck};

pub struct ChangeTracker {
    backend: Arc<dyn DocumentBackend>,
    capabilities: Arc<dyn CapabilityResolver>,
    sync: Arc<DocSynchronizer>,
}

impl ChangeTracker {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        capabilities: Arc<dyn CapabilityResolver>,
        sync: Arc<DocSynchronizer>,
    ) -> Self {
        Self { backend, capabilities, sync }
    }

    /// Line diff of the current content against the baseline.
    pub async fn diff(&self, doc_id: Uuid, user_id: Uuid) -> Result<DiffResult, EngineError> {
        let document = self.backend.fetch(doc_id).await?;
        require_read(self.capabilities.as_ref(), document.workspace_id, user_id, doc_id).await?;
        Ok(line_diff(&document.baseline, &document.content))
    }

    /// Accepts all pending changes: baseline := current content.
    pub async fn accept_all(&self, doc_id: Uuid, user_id: Uuid) -> Result<(), EngineError> {
        let document = self.backend.fetch(doc_id).await?;
        require_write(self.capabilities.as_ref(), document.workspace_id, user_id, Role::Editor)
            .await?;
        self.backend.promote_baseline(doc_id).await
    }

    /// Rejects all pending changes: current content := baseline. The
    /// rollback goes through the synchronizer write path so other
    /// sessions receive it as a regular change notice.
    pub async fn reject_all(
        &self,
        doc_id: Uuid,
        user_id: Uuid,
        origin: Uuid,
    ) -> Result<WriteAck, EngineError> {
        let document = self.backend.fetch(doc_id).await?;
        require_write(self.capabilities.as_ref(), document.workspace_id, user_id, Role::Editor)
            .await?;
        self.sync.write(doc_id, user_id, origin, document.baseline).await
    }
}
