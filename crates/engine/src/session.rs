// Collaboration session coordinator.
//
// Wires one client's edit buffer to the synchronizer and presence store:
// local edits land in the buffer immediately and flush through a
// debounced write; remote notices merge under the last-write-wins
// policy; cursor movement reports presence fire-and-forget.
//
// Known limitation, inherited from the whole-document write model: when
// two sessions edit concurrently, the later flush overwrites the earlier
// one. The merge here is optimistic arbitration between a dirty local
// buffer and an incoming notice, not a character-level merge.

use std::sync::Arc;
use std::time::Instant;

use coscribe_common::types::PresenceRecord;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::debounce::{DebounceConfig, WriteDebouncer};
use crate::error::EngineError;
use crate::presence::PresenceStore;
use crate::store::DocEvent;
use crate::sync::{DocSynchronizer, WriteAck};

/// Connection lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribed,
    Closing,
}

/// What happened to an incoming change notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Remote content replaced the local buffer.
    AppliedRemote,
    /// Local buffer was newer than the notice and was kept; the pending
    /// write remains armed and will overwrite on flush.
    KeptLocal,
    /// The notice was this session's own write echoed back.
    OwnEcho,
    /// The document was deleted remotely; the session is closing.
    DocumentDeleted,
}

pub struct EditorSession {
    origin: Uuid,
    doc_id: Uuid,
    user_id: Uuid,
    sync: Arc<DocSynchronizer>,
    presence: Arc<PresenceStore>,
    state: SessionState,
    buffer: String,
    baseline: String,
    last_seq: i64,
    debouncer: WriteDebouncer,
    events: Option<broadcast::Receiver<DocEvent>>,
}

impl EditorSession {
    pub fn new(
        sync: Arc<DocSynchronizer>,
        presence: Arc<PresenceStore>,
        doc_id: Uuid,
        user_id: Uuid,
        debounce: DebounceConfig,
    ) -> Self {
        Self {
            origin: Uuid::new_v4(),
            doc_id,
            user_id,
            sync,
            presence,
            state: SessionState::Disconnected,
            buffer: String::new(),
            baseline: String::new(),
            last_seq: 0,
            debouncer: WriteDebouncer::new(debounce),
            events: None,
        }
    }

    /// Opens the document and begins accepting local edits.
    pub async fn connect(&mut self) -> Result<(), EngineError> {
        if self.state == SessionState::Subscribed {
            return Ok(());
        }

        self.state = SessionState::Connecting;
        let opened = match self.sync.open(self.doc_id, self.user_id, self.origin).await {
            Ok(opened) => opened,
            Err(error) => {
                self.state = SessionState::Disconnected;
                return Err(error);
            }
        };

        self.buffer = opened.content;
        self.baseline = opened.baseline;
        self.last_seq = opened.seq;
        self.events = Some(opened.events);
        self.state = SessionState::Subscribed;
        Ok(())
    }

    /// Records a local content change. The buffer updates immediately;
    /// the backend write is debounced. Returns false when the session is
    /// not subscribed.
    pub fn local_edit(&mut self, content: impl Into<String>) -> bool {
        self.local_edit_at(content, Instant::now())
    }

    fn local_edit_at(&mut self, content: impl Into<String>, now: Instant) -> bool {
        if self.state != SessionState::Subscribed {
            return false;
        }
        let content = content.into();
        self.buffer = content.clone();
        self.debouncer.record_edit_at(content, now);
        true
    }

    /// Fires the pending debounced write if its window has elapsed.
    ///
    /// Writes are serialized per session: the flush completes (ack or
    /// error) before the next can fire, so rapid edits never amplify
    /// into parallel backend writes. On failure the buffer is kept and
    /// the write re-armed for a caller-driven retry.
    pub async fn flush_due(&mut self) -> Result<Option<WriteAck>, EngineError> {
        self.flush_due_at(Instant::now()).await
    }

    async fn flush_due_at(&mut self, now: Instant) -> Result<Option<WriteAck>, EngineError> {
        if self.state != SessionState::Subscribed {
            return Ok(None);
        }
        let dirty_since = self.debouncer.dirty_since();
        let Some(content) = self.debouncer.take_ready_at(now) else {
            return Ok(None);
        };

        match self.sync.write(self.doc_id, self.user_id, self.origin, content.clone()).await {
            Ok(ack) => {
                self.last_seq = self.last_seq.max(ack.seq);
                Ok(Some(ack))
            }
            Err(error) => {
                warn!(doc_id = %self.doc_id, error = %error, "debounced write failed");
                if let Some(dirty_since) = dirty_since {
                    self.debouncer.restore(content, dirty_since);
                }
                Err(error)
            }
        }
    }

    /// Deadline of the pending write, if any (for timer scheduling).
    pub fn next_flush_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    /// Merges one incoming change event into the session.
    pub fn apply_remote(&mut self, event: &DocEvent) -> RemoteOutcome {
        self.apply_remote_at(event, Instant::now())
    }

    /// Like `apply_remote` with an explicit arrival instant — the moment
    /// the notice was received, which can predate processing.
    fn apply_remote_at(&mut self, event: &DocEvent, arrived_at: Instant) -> RemoteOutcome {
        match event {
            DocEvent::Changed(notice) => {
                if notice.origin == self.origin {
                    self.last_seq = self.last_seq.max(notice.seq);
                    return RemoteOutcome::OwnEcho;
                }

                let keep_local = self
                    .debouncer
                    .dirty_since()
                    .is_some_and(|dirty_since| dirty_since > arrived_at);
                if keep_local {
                    debug!(doc_id = %self.doc_id, seq = notice.seq, "kept newer local buffer over remote change");
                    self.last_seq = self.last_seq.max(notice.seq);
                    return RemoteOutcome::KeptLocal;
                }

                // Remote wins, including over a dirty buffer: stale local
                // edits must not overwrite a newer committed state.
                self.buffer = notice.content.clone();
                self.last_seq = self.last_seq.max(notice.seq);
                self.debouncer.cancel();
                RemoteOutcome::AppliedRemote
            }
            DocEvent::Deleted { .. } => {
                self.state = SessionState::Closing;
                self.debouncer.cancel();
                RemoteOutcome::DocumentDeleted
            }
        }
    }

    /// Drains all queued change events, merging each in order.
    pub fn drain_remote(&mut self) -> Vec<RemoteOutcome> {
        let mut outcomes = Vec::new();
        let Some(mut events) = self.events.take() else {
            return outcomes;
        };

        loop {
            match events.try_recv() {
                Ok(event) => outcomes.push(self.apply_remote(&event)),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(doc_id = %self.doc_id, skipped, "change feed lagged");
                }
                Err(_) => break,
            }
        }
        self.events = Some(events);
        outcomes
    }

    /// Reports a cursor/selection change. Fire-and-forget; never fails.
    pub async fn cursor_moved(&self, cursor: u32, sel_start: u32, sel_end: u32) {
        if self.state != SessionState::Subscribed {
            return;
        }
        self.presence.upsert(self.doc_id, self.user_id, cursor, sel_start, sel_end).await;
    }

    /// Periodic liveness refresh for this session's presence record.
    pub async fn heartbeat(&self) {
        if self.state != SessionState::Subscribed {
            return;
        }
        self.presence.heartbeat(self.doc_id, self.user_id).await;
    }

    /// Other collaborators currently active on this document.
    pub async fn collaborators(&self) -> Vec<PresenceRecord> {
        self.presence.list(self.doc_id, self.user_id).await
    }

    /// Tears the session down: cancels the pending write timer, then
    /// best-effort presence deactivation and subscription release.
    /// Idempotent; never blocks on failure.
    pub async fn close(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Closing;
        self.debouncer.cancel();
        self.presence.deactivate(self.doc_id, self.user_id).await;
        self.sync.close(self.doc_id, self.origin).await;
        self.events = None;
        self.state = SessionState::Disconnected;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn content(&self) -> &str {
        &self.buffer
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn is_dirty(&self) -> bool {
        self.debouncer.is_dirty()
    }

    pub fn last_seq(&self) -> i64 {
        self.last_seq
    }

    /// Stable id identifying this session as a change origin.
    pub fn origin(&self) -> Uuid {
        self.origin
    }
}
