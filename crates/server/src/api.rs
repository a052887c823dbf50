// REST surface: document CRUD, membership bootstrap, and the
// tracked-changes workflow.
//
// Caller identity arrives in the `x-user-id` header; token verification
// happens upstream. Authorization is the engine's capability resolver.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use coscribe_common::types::Role;
use coscribe_engine::capability::CapabilityResolver;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ErrorCode};
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/workspaces/{workspace_id}/members", post(add_member))
        .route("/v1/workspaces/{workspace_id}/documents", post(create_document))
        .route("/v1/documents/{doc_id}", delete(delete_document))
        .route("/v1/documents/{doc_id}/changes", get(get_changes))
        .route("/v1/documents/{doc_id}/changes/accept", post(accept_changes))
        .route("/v1/documents/{doc_id}/changes/reject", post(reject_changes))
        .with_state(state)
}

pub(crate) fn user_id_from_headers(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| {
            ApiError::new(ErrorCode::ValidationFailed, "missing or malformed x-user-id header")
        })
}

// ── Membership ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AddMemberRequest {
    user_id: Uuid,
    role: Role,
}

/// Grants a workspace role. An empty workspace bootstraps by letting the
/// caller claim ownership; afterwards only owners may grant.
async fn add_member(
    Path(workspace_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AddMemberRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = user_id_from_headers(&headers)?;

    if state.membership.has_members(workspace_id).await {
        let caller_role = state.membership.role_for(workspace_id, caller).await?;
        if caller_role != Some(Role::Owner) {
            return Err(ApiError::new(ErrorCode::Forbidden, "only owners may grant roles"));
        }
    } else if payload.user_id != caller || payload.role != Role::Owner {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "an empty workspace is claimed by granting yourself the owner role",
        ));
    }

    state.membership.grant(workspace_id, payload.user_id, payload.role).await;
    Ok(StatusCode::NO_CONTENT)
}

// ── Documents ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateDocumentRequest {
    filename: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct DocumentResponse {
    id: Uuid,
    workspace_id: Uuid,
    filename: String,
    updated_at: DateTime<Utc>,
}

async fn create_document(
    Path(workspace_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = user_id_from_headers(&headers)?;
    let document =
        state.sync.create(workspace_id, caller, &payload.filename, payload.content).await?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            id: document.id,
            workspace_id: document.workspace_id,
            filename: document.filename,
            updated_at: document.updated_at,
        }),
    ))
}

async fn delete_document(
    Path(doc_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let caller = user_id_from_headers(&headers)?;
    state.sync.delete(doc_id, caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Tracked changes ─────────────────────────────────────────────────

async fn get_changes(
    Path(doc_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let caller = user_id_from_headers(&headers)?;
    let diff = state.tracker.diff(doc_id, caller).await?;
    Ok(Json(diff))
}

async fn accept_changes(
    Path(doc_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let caller = user_id_from_headers(&headers)?;
    state.tracker.accept_all(doc_id, caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct RejectResponse {
    seq: i64,
    committed_at: DateTime<Utc>,
}

/// Rolls the document back to its baseline. The rollback propagates to
/// every open session as an ordinary change notice.
async fn reject_changes(
    Path(doc_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let caller = user_id_from_headers(&headers)?;
    // REST calls have no session identity; rollback notices carry a
    // fresh origin so every subscriber applies them.
    let ack = state.tracker.reject_all(doc_id, caller, Uuid::new_v4()).await?;
    Ok(Json(RejectResponse { seq: ack.seq, committed_at: ack.committed_at }))
}
