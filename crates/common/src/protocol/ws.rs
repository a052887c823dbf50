// WebSocket message types for the coscribe-sync.v1 protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::PresenceRecord;

/// All message types in the coscribe-sync.v1 WebSocket protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Client -> Server: initial handshake.
    Hello {
        protocol: String,
        user_id: Uuid,
        workspace_id: Uuid,
    },

    /// Server -> Client: handshake acknowledgement.
    HelloAck {
        server_time: String,
        heartbeat_interval_ms: u32,
    },

    /// Client -> Server: open a document and subscribe to its changes.
    Open {
        doc_id: Uuid,
    },

    /// Server -> Client: document state at subscription time.
    DocState {
        doc_id: Uuid,
        content: String,
        baseline: String,
        seq: i64,
    },

    /// Client -> Server: replace the document content (debounced client-side).
    Write {
        doc_id: Uuid,
        client_write_id: Uuid,
        content: String,
    },

    /// Server -> Client: acknowledgement of a client write.
    WriteAck {
        doc_id: Uuid,
        client_write_id: Uuid,
        seq: i64,
        applied: bool,
    },

    /// Server -> Client: another writer's committed content change.
    Change {
        doc_id: Uuid,
        seq: i64,
        content: String,
        writer_id: Uuid,
    },

    /// Client -> Server: cursor/selection movement.
    Cursor {
        doc_id: Uuid,
        cursor: u32,
        sel_start: u32,
        sel_end: u32,
    },

    /// Server -> Client: active collaborators for a document.
    Presence {
        doc_id: Uuid,
        peers: Vec<PresenceRecord>,
    },

    /// Client -> Server: release a document subscription.
    Close {
        doc_id: Uuid,
    },

    /// Server -> Client: error.
    Error {
        code: String,
        message: String,
        retryable: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        doc_id: Option<Uuid>,
    },
}
