use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, ApiResponse, AppState, MessageResponse, SubmissionDto, validation};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct SpellCheckRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct SpellCheckResponse {
    pub id: i32,
    pub misspelled_words: String,
}

#[derive(Deserialize)]
pub struct HistoryQueryRequest {
    pub username: String,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub username: String,
    pub count: u64,
    pub submissions: Vec<SubmissionDto>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /spell_check
pub async fn spell_check_form(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<ApiResponse<MessageResponse>> {
    Json(ApiResponse::success(MessageResponse::new(format!(
        "Submit up to {} characters of text to check, {}.",
        validation::MAX_SUBMISSION_CHARS,
        user.username
    ))))
}

/// POST /spell_check
/// Run the checker over the submitted text and record the result against
/// the session user. The checker's output is stored verbatim; an empty
/// result is stored as the explicit sentinel, never an empty string.
pub async fn spell_check(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<SpellCheckRequest>,
) -> Result<Json<ApiResponse<SpellCheckResponse>>, ApiError> {
    validation::validate_submission_text(&payload.text)?;

    let misspelled = state
        .checker()
        .check(&payload.text)
        .await
        .map_err(|e| ApiError::internal(format!("Spell check failed: {e}")))?;

    let submission = state
        .store()
        .record_spell_check(&user.username, &payload.text, &misspelled)
        .await?;

    tracing::debug!(
        "Recorded spell check {} for user '{}' ({} misspelled)",
        submission.id,
        user.username,
        misspelled.len()
    );

    Ok(Json(ApiResponse::success(SpellCheckResponse {
        id: submission.id,
        misspelled_words: submission.misspelled_words,
    })))
}

/// GET /history
pub async fn history(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<HistoryResponse>>, ApiError> {
    history_for(&state, &user.username).await
}

/// POST /history
/// Admin-only query of another user's submissions by username.
pub async fn query_history(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<HistoryQueryRequest>,
) -> Result<Json<ApiResponse<HistoryResponse>>, ApiError> {
    if !user.is_admin {
        return Err(ApiError::forbidden("Admin access required"));
    }

    if state
        .store()
        .get_user_by_username(&payload.username)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(
            "No user with this username found".to_string(),
        ));
    }

    history_for(&state, &payload.username).await
}

/// GET /history/query/{id}
/// One submission, visible to its owner or an admin. Missing and forbidden
/// are deliberately the same 404 so submission ids cannot be probed.
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<SubmissionDto>>, ApiError> {
    let submission = state
        .store()
        .get_spell_check(id)
        .await?
        .ok_or_else(|| ApiError::submission_not_found(id))?;

    if submission.username != user.username && !user.is_admin {
        return Err(ApiError::submission_not_found(id));
    }

    Ok(Json(ApiResponse::success(SubmissionDto::from(submission))))
}

async fn history_for(
    state: &AppState,
    username: &str,
) -> Result<Json<ApiResponse<HistoryResponse>>, ApiError> {
    let count = state.store().spell_check_count_for(username).await?;
    let submissions = state.store().spell_checks_for(username).await?;

    Ok(Json(ApiResponse::success(HistoryResponse {
        username: username.to_string(),
        count,
        submissions: submissions.into_iter().map(SubmissionDto::from).collect(),
    })))
}
