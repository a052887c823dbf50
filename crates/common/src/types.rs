// Core domain types shared across all Coscribe crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document within a workspace.
///
/// `content` is the authoritative value all sessions converge toward;
/// `baseline` is the last-accepted snapshot the tracked-changes view
/// diffs against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub workspace_id: Uuid,
    /// Unique within the owning workspace, never empty.
    pub filename: String,
    pub content: String,
    pub baseline: String,
    pub updated_at: DateTime<Utc>,
}

/// Caller's role within a workspace, in ascending order of capability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Editor,
    Owner,
}

impl Role {
    /// Whether this role satisfies `required` (owner ≥ editor ≥ viewer).
    pub fn allows(self, required: Role) -> bool {
        self >= required
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Owner => "owner",
        }
    }
}

/// Ephemeral cursor/selection state for one user in one document.
///
/// Keyed by (document, user) — at most one live record per pair. Offsets
/// are UTF-16 code units into the document content and are best-effort:
/// a remote edit may leave them stale until the next cursor event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    pub doc_id: Uuid,
    pub user_id: Uuid,
    pub cursor: u32,
    /// Selection start; always ≤ `sel_end`.
    pub sel_start: u32,
    pub sel_end: u32,
    pub active: bool,
    pub last_activity: DateTime<Utc>,
}

impl PresenceRecord {
    /// Collapsed selection (caret only, nothing highlighted).
    pub fn is_collapsed(&self) -> bool {
        self.sel_start == self.sel_end
    }
}

/// A committed content change fanned out to document subscribers.
///
/// Notices for one document are delivered in commit order (`seq` is the
/// per-document sequence assigned at commit). `origin` identifies the
/// session whose write produced the notice so subscribers can drop their
/// own echoes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeNotice {
    pub doc_id: Uuid,
    pub seq: i64,
    pub content: String,
    pub writer_id: Uuid,
    pub origin: Uuid,
    pub committed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_allows_upward() {
        assert!(Role::Owner.allows(Role::Editor));
        assert!(Role::Owner.allows(Role::Viewer));
        assert!(Role::Editor.allows(Role::Viewer));
        assert!(Role::Editor.allows(Role::Editor));
        assert!(!Role::Viewer.allows(Role::Editor));
        assert!(!Role::Editor.allows(Role::Owner));
    }

    #[test]
    fn role_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Editor).unwrap(), "\"editor\"");
        let parsed: Role = serde_json::from_str("\"owner\"").unwrap();
        assert_eq!(parsed, Role::Owner);
    }

    #[test]
    fn collapsed_selection_detected() {
        let record = PresenceRecord {
            doc_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cursor: 5,
            sel_start: 5,
            sel_end: 5,
            active: true,
            last_activity: Utc::now(),
        };
        assert!(record.is_collapsed());
    }
}
