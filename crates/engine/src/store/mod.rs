// Storage abstraction over the external persistent store.
//
// The engine talks to its backing store through two narrow async traits:
// document content/baseline plus a per-document change feed, and
// presence records plus a per-document presence feed. The shipped
// implementation is in-memory; a durable backend implements the same
// contracts.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use coscribe_common::types::{ChangeNotice, Document, PresenceRecord};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::EngineError;

/// Buffered capacity of the per-document broadcast feeds.
pub const FEED_CAPACITY: usize = 256;

/// Push event on a document's change feed.
///
/// Events for one document are delivered in the order the store commits
/// them; no ordering holds across documents.
#[derive(Debug, Clone)]
pub enum DocEvent {
    Changed(ChangeNotice),
    Deleted { doc_id: Uuid },
}

/// Push event on a document's presence feed. Consumers re-list on every
/// event rather than patching incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Updated { doc_id: Uuid, user_id: Uuid },
    Removed { doc_id: Uuid, user_id: Uuid },
}

/// Document content, baseline, and change-feed operations.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Inserts a new document. Fails with `Validation` when the filename
    /// is already taken within the workspace.
    async fn insert(&self, document: Document) -> Result<(), EngineError>;

    async fn fetch(&self, doc_id: Uuid) -> Result<Document, EngineError>;

    /// Commits new content: replaces the stored content, stamps the
    /// update time, assigns the next per-document sequence, and publishes
    /// the resulting notice on the change feed before releasing the
    /// commit lock (which is what guarantees in-order delivery).
    async fn commit_content(
        &self,
        doc_id: Uuid,
        content: String,
        writer_id: Uuid,
        origin: Uuid,
    ) -> Result<ChangeNotice, EngineError>;

    /// Sets baseline := current content in one step.
    async fn promote_baseline(&self, doc_id: Uuid) -> Result<(), EngineError>;

    /// Removes the document, its presence records, and publishes a
    /// terminal `Deleted` event to change-feed subscribers.
    async fn remove(&self, doc_id: Uuid) -> Result<(), EngineError>;

    async fn head_seq(&self, doc_id: Uuid) -> Result<i64, EngineError>;

    /// Subscribes to the document's change feed. Valid before the
    /// document exists; dropping the receiver unsubscribes.
    async fn watch_changes(&self, doc_id: Uuid) -> broadcast::Receiver<DocEvent>;
}

/// Presence record and presence-feed operations.
#[async_trait]
pub trait PresenceBackend: Send + Sync {
    async fn put(&self, record: PresenceRecord) -> Result<(), EngineError>;

    async fn get(
        &self,
        doc_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<PresenceRecord>, EngineError>;

    /// All records for a document, active or not, in unspecified order.
    async fn list(&self, doc_id: Uuid) -> Result<Vec<PresenceRecord>, EngineError>;

    /// Drops every presence record for a document (delete cascade).
    async fn remove_document(&self, doc_id: Uuid) -> Result<(), EngineError>;

    async fn watch_presence(&self, doc_id: Uuid) -> broadcast::Receiver<PresenceEvent>;
}
