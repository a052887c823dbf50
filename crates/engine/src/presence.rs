// Presence store: per-(document, user) cursor and selection state.
//
// Presence is advisory. Every operation here is best-effort: backend
// failures are logged and swallowed so a flaky store can never block the
// editing path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use coscribe_common::types::PresenceRecord;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::store::{PresenceBackend, PresenceEvent};

/// Default age after which an `active` record is considered dead. The
/// source design leaves this open; heartbeats refresh it well inside the
/// window.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(45);

pub struct PresenceStore {
    backend: Arc<dyn PresenceBackend>,
    stale_after: chrono::Duration,
}

impl PresenceStore {
    pub fn new(backend: Arc<dyn PresenceBackend>, stale_after: Duration) -> Self {
        let stale_after =
            chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::seconds(45));
        Self { backend, stale_after }
    }

    pub fn with_defaults(backend: Arc<dyn PresenceBackend>) -> Self {
        Self::new(backend, DEFAULT_STALE_AFTER)
    }

    /// Inserts or replaces the caller's record and refreshes liveness.
    ///
    /// An inverted selection is normalized by swapping the endpoints.
    /// Offsets are not validated against the content length: a remote
    /// edit can legitimately leave them stale.
    pub async fn upsert(
        &self,
        doc_id: Uuid,
        user_id: Uuid,
        cursor: u32,
        sel_start: u32,
        sel_end: u32,
    ) {
        let (sel_start, sel_end) =
            if sel_start <= sel_end { (sel_start, sel_end) } else { (sel_end, sel_start) };

        let record = PresenceRecord {
            doc_id,
            user_id,
            cursor,
            sel_start,
            sel_end,
            active: true,
            last_activity: Utc::now(),
        };

        if let Err(error) = self.backend.put(record).await {
            warn!(doc_id = %doc_id, user_id = %user_id, error = %error, "presence upsert failed");
        }
    }

    /// Refreshes last-activity without moving the cursor. No-op when the
    /// user has no record yet.
    pub async fn heartbeat(&self, doc_id: Uuid, user_id: Uuid) {
        let existing = match self.backend.get(doc_id, user_id).await {
            Ok(existing) => existing,
            Err(error) => {
                warn!(doc_id = %doc_id, user_id = %user_id, error = %error, "presence heartbeat failed");
                return;
            }
        };

        let Some(mut record) = existing else {
            return;
        };
        record.last_activity = Utc::now();
        if let Err(error) = self.backend.put(record).await {
            warn!(doc_id = %doc_id, user_id = %user_id, error = %error, "presence heartbeat failed");
        }
    }

    /// Marks the caller's record inactive. Attempted on every teardown
    /// path; failure leaves a staleness window closed by `stale_after`.
    pub async fn deactivate(&self, doc_id: Uuid, user_id: Uuid) {
        let existing = match self.backend.get(doc_id, user_id).await {
            Ok(existing) => existing,
            Err(error) => {
                warn!(doc_id = %doc_id, user_id = %user_id, error = %error, "presence deactivate failed");
                return;
            }
        };

        let Some(mut record) = existing else {
            return;
        };
        record.active = false;
        if let Err(error) = self.backend.put(record).await {
            warn!(doc_id = %doc_id, user_id = %user_id, error = %error, "presence deactivate failed");
        }
    }

    /// Active, non-stale collaborators for a document, excluding the
    /// caller, ordered by user id for deterministic rendering.
    pub async fn list(&self, doc_id: Uuid, excluding_user: Uuid) -> Vec<PresenceRecord> {
        self.list_at(Utc::now(), doc_id, excluding_user).await
    }

    async fn list_at(
        &self,
        now: DateTime<Utc>,
        doc_id: Uuid,
        excluding_user: Uuid,
    ) -> Vec<PresenceRecord> {
        let records = match self.backend.list(doc_id).await {
            Ok(records) => records,
            Err(error) => {
                warn!(doc_id = %doc_id, error = %error, "presence list failed");
                return Vec::new();
            }
        };

        let mut live: Vec<PresenceRecord> = records
            .into_iter()
            .filter(|record| {
                record.user_id != excluding_user
                    && record.active
                    && now.signed_duration_since(record.last_activity) <= self.stale_after
            })
            .collect();
        live.sort_by_key(|record| record.user_id);
        live
    }

    /// Per-document presence feed; consumers re-list on every event.
    pub async fn subscribe(&self, doc_id: Uuid) -> broadcast::Receiver<PresenceEvent> {
        self.backend.watch_presence(doc_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn store() -> (PresenceStore, Arc<MemoryStore>) {
        let backend = Arc::new(MemoryStore::new());
        (PresenceStore::with_defaults(backend.clone()), backend)
    }

    // ── Upsert / list ──────────────────────────────────────────────

    #[tokio::test]
    async fn list_excludes_the_caller() {
        let (presence, _) = store();
        let doc_id = Uuid::new_v4();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        presence.upsert(doc_id, me, 1, 1, 1).await;
        presence.upsert(doc_id, other, 2, 2, 2).await;

        let listed = presence.list(doc_id, me).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, other);
    }

    #[tokio::test]
    async fn upsert_replaces_prior_record() {
        let (presence, _) = store();
        let doc_id = Uuid::new_v4();
        let user = Uuid::new_v4();

        presence.upsert(doc_id, user, 3, 3, 3).await;
        presence.upsert(doc_id, user, 8, 8, 10).await;

        let listed = presence.list(doc_id, Uuid::new_v4()).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].cursor, 8);
        assert_eq!((listed[0].sel_start, listed[0].sel_end), (8, 10));
    }

    #[tokio::test]
    async fn inverted_selection_is_normalized() {
        let (presence, _) = store();
        let doc_id = Uuid::new_v4();
        let user = Uuid::new_v4();

        presence.upsert(doc_id, user, 4, 9, 4).await;

        let listed = presence.list(doc_id, Uuid::new_v4()).await;
        assert_eq!((listed[0].sel_start, listed[0].sel_end), (4, 9));
    }

    // ── Deactivation ───────────────────────────────────────────────

    #[tokio::test]
    async fn deactivated_records_never_listed() {
        let (presence, _) = store();
        let doc_id = Uuid::new_v4();
        let user = Uuid::new_v4();

        presence.upsert(doc_id, user, 5, 5, 5).await;
        presence.deactivate(doc_id, user).await;

        // Freshly deactivated — recency does not resurrect it.
        assert!(presence.list(doc_id, Uuid::new_v4()).await.is_empty());
    }

    #[tokio::test]
    async fn deactivate_without_record_is_a_noop() {
        let (presence, _) = store();
        presence.deactivate(Uuid::new_v4(), Uuid::new_v4()).await;
    }

    // ── Staleness ──────────────────────────────────────────────────

    #[tokio::test]
    async fn stale_records_are_excluded_even_when_active() {
        let (presence, backend) = store();
        let doc_id = Uuid::new_v4();
        let user = Uuid::new_v4();

        let stale = PresenceRecord {
            doc_id,
            user_id: user,
            cursor: 0,
            sel_start: 0,
            sel_end: 0,
            active: true,
            last_activity: Utc::now() - chrono::Duration::seconds(120),
        };
        backend.put(stale).await.unwrap();

        assert!(presence.list(doc_id, Uuid::new_v4()).await.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_keeps_a_record_live() {
        let (presence, backend) = store();
        let doc_id = Uuid::new_v4();
        let user = Uuid::new_v4();

        let aging = PresenceRecord {
            doc_id,
            user_id: user,
            cursor: 0,
            sel_start: 0,
            sel_end: 0,
            active: true,
            last_activity: Utc::now() - chrono::Duration::seconds(40),
        };
        backend.put(aging).await.unwrap();
        presence.heartbeat(doc_id, user).await;

        let listed = presence.list(doc_id, Uuid::new_v4()).await;
        assert_eq!(listed.len(), 1);
    }

    // ── Best-effort behavior on a failing backend ──────────────────

    struct UnavailableBackend;

    #[async_trait]
    impl PresenceBackend for UnavailableBackend {
        async fn put(&self, _record: PresenceRecord) -> Result<(), EngineError> {
            Err(EngineError::unavailable("store offline"))
        }

        async fn get(
            &self,
            _doc_id: Uuid,
            _user_id: Uuid,
        ) -> Result<Option<PresenceRecord>, EngineError> {
            Err(EngineError::unavailable("store offline"))
        }

        async fn list(&self, _doc_id: Uuid) -> Result<Vec<PresenceRecord>, EngineError> {
            Err(EngineError::unavailable("store offline"))
        }

        async fn remove_document(&self, _doc_id: Uuid) -> Result<(), EngineError> {
            Err(EngineError::unavailable("store offline"))
        }

        async fn watch_presence(&self, _doc_id: Uuid) -> broadcast::Receiver<PresenceEvent> {
            broadcast::channel(1).1
        }
    }

    #[tokio::test]
    async fn backend_failures_are_swallowed() {
        let presence = PresenceStore::with_defaults(Arc::new(UnavailableBackend));
        let doc_id = Uuid::new_v4();
        let user = Uuid::new_v4();

        // None of these may panic or propagate an error.
        presence.upsert(doc_id, user, 1, 1, 1).await;
        presence.heartbeat(doc_id, user).await;
        presence.deactivate(doc_id, user).await;
        assert!(presence.list(doc_id, user).await.is_empty());
    }
}
