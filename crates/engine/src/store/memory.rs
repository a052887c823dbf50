use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use coscribe_common::types::{ChangeNotice, Document, PresenceRecord};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{DocEvent, DocumentBackend, PresenceBackend, PresenceEvent, FEED_CAPACITY};
use crate::error::EngineError;

#[derive(Debug)]
struct DocEntry {
    document: Document,
    head_seq: i64,
}

/// In-memory backing store with per-document broadcast feeds.
///
/// Commit order equals delivery order: content commits assign the
/// sequence and publish the notice while still holding the write lock,
/// so two writers to the same document can never interleave their
/// notifications.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<HashMap<Uuid, DocEntry>>>,
    change_feeds: Arc<RwLock<HashMap<Uuid, broadcast::Sender<DocEvent>>>>,
    presence: Arc<RwLock<HashMap<(Uuid, Uuid), PresenceRecord>>>,
    presence_feeds: Arc<RwLock<HashMap<Uuid, broadcast::Sender<PresenceEvent>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn change_sender(&self, doc_id: Uuid) -> broadcast::Sender<DocEvent> {
        let mut feeds = self.change_feeds.write().await;
        feeds.entry(doc_id).or_insert_with(|| broadcast::channel(FEED_CAPACITY).0).clone()
    }

    async fn presence_sender(&self, doc_id: Uuid) -> broadcast::Sender<PresenceEvent> {
        let mut feeds = self.presence_feeds.write().await;
        feeds.entry(doc_id).or_insert_with(|| broadcast::channel(FEED_CAPACITY).0).clone()
    }
}

#[async_trait]
impl DocumentBackend for MemoryStore {
    async fn insert(&self, document: Document) -> Result<(), EngineError> {
        let mut docs = self.docs.write().await;
        let taken = docs.values().any(|entry| {
            entry.document.workspace_id == document.workspace_id
                && entry.document.filename == document.filename
        });
        if taken {
            return Err(EngineError::Validation(format!(
                "filename '{}' already exists in workspace",
                document.filename
            )));
        }
        docs.insert(document.id, DocEntry { document, head_seq: 0 });
        Ok(())
    }

    async fn fetch(&self, doc_id: Uuid) -> Result<Document, EngineError> {
        self.docs
            .read()
            .await
            .get(&doc_id)
            .map(|entry| entry.document.clone())
            .ok_or(EngineError::NotFound { doc_id })
    }

    async fn commit_content(
        &self,
        doc_id: Uuid,
        content: String,
        writer_id: Uuid,
        origin: Uuid,
    ) -> Result<ChangeNotice, EngineError> {
        let sender = self.change_sender(doc_id).await;

        let mut docs = self.docs.write().await;
        let entry = docs.get_mut(&doc_id).ok_or(EngineError::NotFound { doc_id })?;

        let committed_at = Utc::now();
        entry.head_seq += 1;
        entry.document.content = content.clone();
        entry.document.updated_at = committed_at;

        let notice = ChangeNotice {
            doc_id,
            seq: entry.head_seq,
            content,
            writer_id,
            origin,
            committed_at,
        };
        // Published under the write lock so notices leave in commit order.
        let _ = sender.send(DocEvent::Changed(notice.clone()));
        Ok(notice)
    }

    async fn promote_baseline(&self, doc_id: Uuid) -> Result<(), EngineError> {
        let mut docs = self.docs.write().await;
        let entry = docs.get_mut(&doc_id).ok_or(EngineError::NotFound { doc_id })?;
        entry.document.baseline = entry.document.content.clone();
        Ok(())
    }

    async fn remove(&self, doc_id: Uuid) -> Result<(), EngineError> {
        {
            let mut docs = self.docs.write().await;
            if docs.remove(&doc_id).is_none() {
                return Err(EngineError::NotFound { doc_id });
            }
        }

        self.remove_document(doc_id).await?;

        if let Some(sender) = self.change_feeds.read().await.get(&doc_id) {
            let _ = sender.send(DocEvent::Deleted { doc_id });
        }
        Ok(())
    }

    async fn head_seq(&self, doc_id: Uuid) -> Result<i64, EngineError> {
        self.docs
            .read()
            .await
            .get(&doc_id)
            .map(|entry| entry.head_seq)
            .ok_or(EngineError::NotFound { doc_id })
    }

    async fn watch_changes(&self, doc_id: Uuid) -> broadcast::Receiver<DocEvent> {
        self.change_sender(doc_id).await.subscribe()
    }
}

#[async_trait]
impl PresenceBackend for MemoryStore {
    async fn put(&self, record: PresenceRecord) -> Result<(), EngineError> {
        let doc_id = record.doc_id;
        let user_id = record.user_id;
        self.presence.write().await.insert((doc_id, user_id), record);

        let sender = self.presence_sender(doc_id).await;
        let _ = sender.send(PresenceEvent::Updated { doc_id, user_id });
        Ok(())
    }

    async fn get(
        &self,
        doc_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<PresenceRecord>, EngineError> {
        Ok(self.presence.read().await.get(&(doc_id, user_id)).cloned())
    }

    async fn list(&self, doc_id: Uuid) -> Result<Vec<PresenceRecord>, EngineError> {
        Ok(self
            .presence
            .read()
            .await
            .values()
            .filter(|record| record.doc_id == doc_id)
            .cloned()
            .collect())
    }

    async fn remove_document(&self, doc_id: Uuid) -> Result<(), EngineError> {
        let removed: Vec<Uuid> = {
            let mut presence = self.presence.write().await;
            let user_ids: Vec<Uuid> = presence
                .keys()
                .filter(|(record_doc, _)| *record_doc == doc_id)
                .map(|(_, user_id)| *user_id)
                .collect();
            for user_id in &user_ids {
                presence.remove(&(doc_id, *user_id));
            }
            user_ids
        };

        if !removed.is_empty() {
            let sender = self.presence_sender(doc_id).await;
            for user_id in removed {
                let _ = sender.send(PresenceEvent::Removed { doc_id, user_id });
            }
        }
        Ok(())
    }

    async fn watch_presence(&self, doc_id: Uuid) -> broadcast::Receiver<PresenceEvent> {
        self.presence_sender(doc_id).await.subscribe()
    }
}
