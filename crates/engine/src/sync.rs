// Document synchronizer: the single write path for shared content.
//
// Conflict policy is last-write-wins at whole-document granularity.
// Concurrent writers race and the later commit overwrites the earlier
// one; there is deliberately no locking and no merge. Sessions layer an
// optimistic dirty-buffer check on top (see `session`), and callers
// wanting character-level merge must build it above this interface.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coscribe_common::types::{Document, Role};
use tokio::sync::{broadcast, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::capability::{require_read, require_write, CapabilityResolver};
use crate::error::EngineError;
use crate::store::{DocEvent, DocumentBackend};

/// Live view handed to a session when it opens a document.
#[derive(Debug)]
pub struct OpenedDoc {
    pub content: String,
    pub baseline: String,
    /// Head sequence at open; later notices carry larger values.
    pub seq: i64,
    /// Change feed for this document. Dropping it unsubscribes.
    pub events: broadcast::Receiver<DocEvent>,
}

/// Acknowledgement of a persisted write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    pub seq: i64,
    pub committed_at: DateTime<Utc>,
}

pub struct DocSynchronizer {
    backend: Arc<dyn DocumentBackend>,
    capabilities: Arc<dyn CapabilityResolver>,
    /// Origin ids of sessions currently holding each document open.
    subscribers: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl DocSynchronizer {
    pub fn new(backend: Arc<dyn DocumentBackend>, capabilities: Arc<dyn CapabilityResolver>) -> Self {
        Self { backend, capabilities, subscribers: RwLock::new(HashMap::new()) }
    }

    /// Creates a document. Requires the editor role; the filename must be
    /// non-empty and unique within the workspace.
    pub async fn create(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        filename: &str,
        content: String,
    ) -> Result<Document, EngineError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(EngineError::Validation("filename must not be empty".into()));
        }
        require_write(self.capabilities.as_ref(), workspace_id, user_id, Role::Editor).await?;

        let document = Document {
            id: Uuid::new_v4(),
            workspace_id,
            filename: filename.to_owned(),
            baseline: content.clone(),
            content,
            updated_at: Utc::now(),
        };
        self.backend.insert(document.clone()).await?;
        info!(doc_id = %document.id, workspace_id = %workspace_id, filename, "document created");
        Ok(document)
    }

    /// Opens a document for a session, establishing a live subscription.
    ///
    /// Fails with `NotFound` when the document is absent or the caller
    /// has no read capability (existence is not leaked).
    pub async fn open(
        &self,
        doc_id: Uuid,
        user_id: Uuid,
        origin: Uuid,
    ) -> Result<OpenedDoc, EngineError> {
        let meta = self.backend.fetch(doc_id).await?;
        require_read(self.capabilities.as_ref(), meta.workspace_id, user_id, doc_id).await?;

        // Subscribe before reading content so no commit can land between
        // the snapshot and the first notice.
        let events = self.backend.watch_changes(doc_id).await;
        let document = self.backend.fetch(doc_id).await?;
        let seq = self.backend.head_seq(doc_id).await?;
        self.subscribers.write().await.entry(doc_id).or_default().insert(origin);

        Ok(OpenedDoc { content: document.content, baseline: document.baseline, seq, events })
    }

    /// Persists new content and fans a change notice out to every
    /// subscriber of the document, in commit order.
    pub async fn write(
        &self,
        doc_id: Uuid,
        user_id: Uuid,
        origin: Uuid,
        content: String,
    ) -> Result<WriteAck, EngineError> {
        let document = self.backend.fetch(doc_id).await?;
        require_write(self.capabilities.as_ref(), document.workspace_id, user_id, Role::Editor)
            .await?;

        let notice = self.backend.commit_content(doc_id, content, user_id, origin).await?;
        Ok(WriteAck { seq: notice.seq, committed_at: notice.committed_at })
    }

    /// Fresh change subscription without the open bookkeeping.
    pub async fn subscribe(&self, doc_id: Uuid) -> broadcast::Receiver<DocEvent> {
        self.backend.watch_changes(doc_id).await
    }

    /// Releases a session's subscription. Idempotent.
    pub async fn close(&self, doc_id: Uuid, origin: Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(origins) = subscribers.get_mut(&doc_id) {
            origins.remove(&origin);
            if origins.is_empty() {
                subscribers.remove(&doc_id);
            }
        }
    }

    /// Deletes a document. Requires the owner role; cascades presence
    /// records and pushes a terminal `Deleted` event to subscribers.
    pub async fn delete(&self, doc_id: Uuid, user_id: Uuid) -> Result<(), EngineError> {
        let document = self.backend.fetch(doc_id).await?;
        require_write(self.capabilities.as_ref(), document.workspace_id, user_id, Role::Owner)
            .await?;

        self.backend.remove(doc_id).await?;
        self.subscribers.write().await.remove(&doc_id);
        info!(doc_id = %doc_id, workspace_id = %document.workspace_id, "document deleted");
        Ok(())
    }

    /// Number of sessions currently holding the document open.
    pub async fn subscriber_count(&self, doc_id: Uuid) -> usize {
        self.subscribers.read().await.get(&doc_id).map(HashSet::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MembershipStore;
    use crate::store::MemoryStore;

    struct Fixture {
        sync: DocSynchronizer,
        membership: MembershipStore,
        workspace_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(MemoryStore::new());
        let membership = MembershipStore::default();
        let sync = DocSynchronizer::new(backend, Arc::new(membership.clone()));
        Fixture { sync, membership, workspace_id: Uuid::new_v4() }
    }

    async fn editor(fixture: &Fixture) -> Uuid {
        let user_id = Uuid::new_v4();
        fixture.membership.grant(fixture.workspace_id, user_id, Role::Editor).await;
        user_id
    }

    // ── Create ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_rejects_empty_filename() {
        let fixture = fixture().await;
        let user = editor(&fixture).await;

        let error = fixture
            .sync
            .create(fixture.workspace_id, user, "  ", String::new())
            .await
            .expect_err("empty filename");
        assert!(matches!(error, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn create_requires_editor_role() {
        let fixture = fixture().await;
        let viewer = Uuid::new_v4();
        fixture.membership.grant(fixture.workspace_id, viewer, Role::Viewer).await;

        let error = fixture
            .sync
            .create(fixture.workspace_id, viewer, "doc.md", String::new())
            .await
            .expect_err("viewer cannot create");
        assert_eq!(error, EngineError::PermissionDenied { required: Role::Editor });
    }

    #[tokio::test]
    async fn create_sets_baseline_to_initial_content() {
        let fixture = fixture().await;
        let user = editor(&fixture).await;

        let document = fixture
            .sync
            .create(fixture.workspace_id, user, "doc.md", "# Title".into())
            .await
            .unwrap();
        assert_eq!(document.baseline, "# Title");
        assert_eq!(document.content, "# Title");
    }

    // ── Open ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn open_missing_document_is_not_found() {
        let fixture = fixture().await;
        let user = editor(&fixture).await;
        let doc_id = Uuid::new_v4();

        let error = fixture.sync.open(doc_id, user, Uuid::new_v4()).await.expect_err("missing");
        assert_eq!(error, EngineError::NotFound { doc_id });
    }

    #[tokio::test]
    async fn open_without_membership_masks_as_not_found() {
        let fixture = fixture().await;
        let user = editor(&fixture).await;
        let document = fixture
            .sync
            .create(fixture.workspace_id, user, "doc.md", String::new())
            .await
            .unwrap();

        let outsider = Uuid::new_v4();
        let error = fixture
            .sync
            .open(document.id, outsider, Uuid::new_v4())
            .await
            .expect_err("outsider must not learn the document exists");
        assert_eq!(error, EngineError::NotFound { doc_id: document.id });
    }

    #[tokio::test]
    async fn open_tracks_subscribers_and_close_is_idempotent() {
        let fixture = fixture().await;
        let user = editor(&fixture).await;
        let document = fixture
            .sync
            .create(fixture.workspace_id, user, "doc.md", String::new())
            .await
            .unwrap();

        let origin = Uuid::new_v4();
        let _opened = fixture.sync.open(document.id, user, origin).await.unwrap();
        assert_eq!(fixture.sync.subscriber_count(document.id).await, 1);

        fixture.sync.close(document.id, origin).await;
        fixture.sync.close(document.id, origin).await;
        assert_eq!(fixture.sync.subscriber_count(document.id).await, 0);
    }

    // ── Write ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn write_by_viewer_is_denied_and_leaves_content_untouched() {
        let fixture = fixture().await;
        let user = editor(&fixture).await;
        let document = fixture
            .sync
            .create(fixture.workspace_id, user, "doc.md", "original".into())
            .await
            .unwrap();

        let viewer = Uuid::new_v4();
        fixture.membership.grant(fixture.workspace_id, viewer, Role::Viewer).await;

        let error = fixture
            .sync
            .write(document.id, viewer, Uuid::new_v4(), "hijacked".into())
            .await
            .expect_err("viewer cannot write");
        assert_eq!(error, EngineError::PermissionDenied { required: Role::Editor });

        let opened = fixture.sync.open(document.id, user, Uuid::new_v4()).await.unwrap();
        assert_eq!(opened.content, "original");
        assert_eq!(opened.seq, 0);
    }

    #[tokio::test]
    async fn write_notifies_other_subscribers_with_new_content() {
        let fixture = fixture().await;
        let writer = editor(&fixture).await;
        let reader = editor(&fixture).await;
        let document = fixture
            .sync
            .create(fixture.workspace_id, writer, "doc.md", String::new())
            .await
            .unwrap();

        let mut opened_b = fixture.sync.open(document.id, reader, Uuid::new_v4()).await.unwrap();

        let ack = fixture
            .sync
            .write(document.id, writer, Uuid::new_v4(), "hello".into())
            .await
            .unwrap();
        assert_eq!(ack.seq, 1);

        let DocEvent::Changed(notice) = opened_b.events.recv().await.unwrap() else {
            panic!("expected change notice");
        };
        assert_eq!(notice.content, "hello");
        assert_eq!(notice.seq, 1);
        assert_eq!(notice.writer_id, writer);
    }

    #[tokio::test]
    async fn writes_to_one_document_arrive_in_commit_order() {
        let fixture = fixture().await;
        let writer = editor(&fixture).await;
        let document = fixture
            .sync
            .create(fixture.workspace_id, writer, "doc.md", String::new())
            .await
            .unwrap();

        let mut events = fixture.sync.subscribe(document.id).await;
        for content in ["a", "b", "c"] {
            fixture
                .sync
                .write(document.id, writer, Uuid::new_v4(), content.into())
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            if let DocEvent::Changed(notice) = events.recv().await.unwrap() {
                seen.push((notice.seq, notice.content));
            }
        }
        assert_eq!(
            seen,
            vec![(1, "a".to_owned()), (2, "b".to_owned()), (3, "c".to_owned())]
        );
    }

    // ── Delete ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn delete_requires_owner() {
        let fixture = fixture().await;
        let user = editor(&fixture).await;
        let document = fixture
            .sync
            .create(fixture.workspace_id, user, "doc.md", String::new())
            .await
            .unwrap();

        let error =
            fixture.sync.delete(document.id, user).await.expect_err("editor cannot delete");
        assert_eq!(error, EngineError::PermissionDenied { required: Role::Owner });
    }

    #[tokio::test]
    async fn delete_notifies_subscribers() {
        let fixture = fixture().await;
        let owner = Uuid::new_v4();
        fixture.membership.grant(fixture.workspace_id, owner, Role::Owner).await;
        let document = fixture
            .sync
            .create(fixture.workspace_id, owner, "doc.md", String::new())
            .await
            .unwrap();

        let mut opened = fixture.sync.open(document.id, owner, Uuid::new_v4()).await.unwrap();
        fixture.sync.delete(document.id, owner).await.unwrap();

        assert!(matches!(
            opened.events.recv().await.unwrap(),
            DocEvent::Deleted { doc_id } if doc_id == document.id
        ));
        assert_eq!(fixture.sync.subscriber_count(document.id).await, 0);
    }
}
