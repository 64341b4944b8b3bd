use axum::{
    Json,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, AuthLogDto, MessageResponse, validation};
use crate::db::User;
use crate::services::MfaState;

pub const SESSION_USER_ID: &str = "user_id";
pub const SESSION_LOGIN_ID: &str = "login_id";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub username: String,
}

#[derive(Serialize)]
pub struct AccountResponse {
    pub username: String,
    pub mfa_registered: bool,
    pub is_admin: bool,
    pub created_at: String,
}

#[derive(Deserialize)]
pub struct AccountUpdateRequest {
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub mfa_enabled: Option<bool>,
}

#[derive(Serialize)]
pub struct AccountUpdateResponse {
    pub password_changed: bool,
    pub mfa_setup_required: bool,
    pub mfa_disabled: bool,
}

#[derive(Serialize)]
pub struct MultifactorResponse {
    pub secret: String,
    pub provisioning_uri: String,
}

#[derive(Deserialize)]
pub struct MultifactorConfirmRequest {
    pub confirm: bool,
}

#[derive(Serialize)]
pub struct MultifactorConfirmResponse {
    pub enrolled: bool,
}

#[derive(Deserialize)]
pub struct LoginHistoryRequest {
    pub user_id: i32,
}

// ============================================================================
// Middleware
// ============================================================================

/// The session user, resolved once per request by [`require_login`] and
/// threaded through request extensions.
#[derive(Clone)]
pub struct CurrentUser(pub User);

/// Gate for protected routes. Resolves the session's user id to a full user
/// record; anonymous (or stale) sessions are redirected to `/login` before
/// the underlying handler can run any side effects.
pub async fn require_login(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id: Option<i32> = session
        .get(SESSION_USER_ID)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let Some(user_id) = user_id else {
        return Ok(Redirect::to("/login").into_response());
    };

    let Some(user) = state
        .store()
        .get_user_by_id(user_id)
        .await
        .map_err(ApiError::from)?
    else {
        // User row gone since the session was issued; drop the session.
        let _ = session.flush().await;
        return Ok(Redirect::to("/login").into_response());
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

async fn session_user(session: &Session, state: &AppState) -> Result<Option<User>, ApiError> {
    let user_id: Option<i32> = session
        .get(SESSION_USER_ID)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    match user_id {
        Some(id) => Ok(state.store().get_user_by_id(id).await?),
        None => Ok(None),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /
pub async fn index(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let message = match session_user(&session, &state).await? {
        Some(user) => format!("Logged in as {}.", user.username),
        None => "Welcome. Please log in or register.".to_string(),
    };

    Ok(Json(ApiResponse::success(MessageResponse::new(message))))
}

/// GET /register
pub async fn register_form(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, ApiError> {
    if session_user(&session, &state).await?.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Register a new account.",
    )))
    .into_response())
}

/// POST /register
/// Create a new user. Anonymous only; a live session is bounced to `/`.
pub async fn register(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    if session_user(&session, &state).await?.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    validation::validate_username(&payload.username)?;
    validation::validate_password(&payload.password)?;

    let security = state.config().read().await.security.clone();

    let created = state
        .store()
        .create_user(&payload.username, &payload.password, false, &security)
        .await?;

    if created.is_none() {
        return Err(ApiError::Conflict("Username is not available.".to_string()));
    }

    tracing::info!("Registered user '{}'", payload.username);

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Registration success.",
    )))
    .into_response())
}

/// GET /login
pub async fn login_form(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, ApiError> {
    if session_user(&session, &state).await?.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Log in with username, password and (if enrolled) a one-time code.",
    )))
    .into_response())
}

/// POST /login
/// Verify both factors, then establish the session: flush any pre-existing
/// session id, open an audit record, and bind both to the fresh session as
/// one step. No failure path mutates session or audit state.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if session_user(&session, &state).await?.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let user = state
        .auth()
        .authenticate(&payload.username, &payload.password, payload.code.as_deref())
        .await?;

    // Fresh session id before anything is stored, so a fixated token never
    // inherits the authenticated state.
    session
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let login_id = state.store().open_auth_log(user.id, &user.username).await?;

    session
        .insert(SESSION_USER_ID, user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;
    session
        .insert(SESSION_LOGIN_ID, login_id)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    tracing::info!("User '{}' logged in (audit record {})", user.username, login_id);

    Ok(Json(ApiResponse::success(LoginResponse {
        message: "Login success.".to_string(),
        username: user.username,
    }))
    .into_response())
}

/// GET /logout
/// Close the session's audit record and clear the session. A session whose
/// audit record has vanished is corrupt: the session is still cleared so the
/// client is not stuck, but the request fails loudly.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, ApiError> {
    let login_id: Option<i32> = session
        .get(SESSION_LOGIN_ID)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    if let Some(login_id) = login_id {
        let closed = state.store().close_auth_log(login_id).await?;

        if !closed {
            tracing::error!("Logout found no audit record with id {}", login_id);
            let _ = session.flush().await;
            return Err(ApiError::ConsistencyError(format!(
                "Audit record {} missing at logout",
                login_id
            )));
        }
    }

    session
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    Ok(Redirect::to("/login").into_response())
}

/// GET /account
pub async fn account(
    axum::Extension(CurrentUser(user)): axum::Extension<CurrentUser>,
) -> Json<ApiResponse<AccountResponse>> {
    Json(ApiResponse::success(AccountResponse {
        username: user.username,
        mfa_registered: user.mfa_registered,
        is_admin: user.is_admin,
        created_at: user.created_at,
    }))
}

/// POST /account
/// Password change and MFA toggle are independent, idempotent operations
/// within one submission. Enabling MFA does not complete here; it parks the
/// user in pending setup, finished at /multifactor.
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    axum::Extension(CurrentUser(user)): axum::Extension<CurrentUser>,
    Json(payload): Json<AccountUpdateRequest>,
) -> Result<Json<ApiResponse<AccountUpdateResponse>>, ApiError> {
    let mut password_changed = false;
    let mut mfa_setup_required = false;
    let mut mfa_disabled = false;

    if let Some(new_password) = &payload.new_password {
        validation::validate_password(new_password)?;
        let security = state.config().read().await.security.clone();
        state
            .store()
            .update_user_password(&user.username, new_password, &security)
            .await?;
        password_changed = true;
        tracing::info!("Password changed for user '{}'", user.username);
    }

    match payload.mfa_enabled {
        Some(true) => match state.mfa().state(&user).await? {
            MfaState::Enrolled => {}
            MfaState::Unenrolled | MfaState::PendingSetup => {
                state.mfa().begin_setup(&user).await?;
                mfa_setup_required = true;
            }
        },
        Some(false) => {
            if state.mfa().state(&user).await? == MfaState::Enrolled {
                state.mfa().disable(&user).await?;
                mfa_disabled = true;
                tracing::info!("MFA disabled for user '{}'", user.username);
            }
        }
        None => {}
    }

    Ok(Json(ApiResponse::success(AccountUpdateResponse {
        password_changed,
        mfa_setup_required,
        mfa_disabled,
    })))
}

/// GET /multifactor
/// Provisioning material for a pending enrollment. Already-enrolled users
/// (and users with nothing pending) are bounced back to the account page so
/// the secret is never re-disclosed.
pub async fn multifactor(
    State(state): State<Arc<AppState>>,
    axum::Extension(CurrentUser(user)): axum::Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    match state.mfa().state(&user).await? {
        MfaState::PendingSetup => {}
        MfaState::Enrolled | MfaState::Unenrolled => {
            return Ok(Redirect::to("/account").into_response());
        }
    }

    let provisioning_uri = state.mfa().provisioning_uri(&user).await?;
    let secret = state
        .store()
        .get_mfa_secret(&user.username)
        .await?
        .ok_or_else(|| ApiError::consistency_for("multifactor"))?;

    Ok(Json(ApiResponse::success(MultifactorResponse {
        secret,
        provisioning_uri,
    }))
    .into_response())
}

/// POST /multifactor
/// Confirm finishes enrollment; decline discards the pending credential.
pub async fn confirm_multifactor(
    State(state): State<Arc<AppState>>,
    axum::Extension(CurrentUser(user)): axum::Extension<CurrentUser>,
    Json(payload): Json<MultifactorConfirmRequest>,
) -> Result<Json<ApiResponse<MultifactorConfirmResponse>>, ApiError> {
    let enrolled = state.mfa().confirm_setup(&user, payload.confirm).await?;

    if enrolled {
        tracing::info!("MFA enrolled for user '{}'", user.username);
    }

    Ok(Json(ApiResponse::success(MultifactorConfirmResponse {
        enrolled,
    })))
}

/// GET /qrcode
/// PNG provisioning aid; refused with a 404 once enrolled or when nothing
/// is pending.
pub async fn qrcode(
    State(state): State<Arc<AppState>>,
    axum::Extension(CurrentUser(user)): axum::Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    match state.mfa().state(&user).await? {
        MfaState::PendingSetup => {}
        MfaState::Enrolled | MfaState::Unenrolled => {
            return Err(ApiError::NotFound("No enrollment QR available".to_string()));
        }
    }

    let png = state.mfa().qr_png(&user).await?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

/// GET /login_history
/// Admin only; hard denial for everyone else, never a redirect.
pub async fn login_history(
    State(state): State<Arc<AppState>>,
    axum::Extension(CurrentUser(user)): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<AuthLogDto>>>, ApiError> {
    if !user.is_admin {
        return Err(ApiError::forbidden("Admin access required"));
    }

    let entries = state.store().auth_log_for_user(user.id).await?;

    Ok(Json(ApiResponse::success(
        entries.into_iter().map(AuthLogDto::from).collect(),
    )))
}

/// POST /login_history
/// Admin queries another user's audit trail by user id.
pub async fn query_login_history(
    State(state): State<Arc<AppState>>,
    axum::Extension(CurrentUser(user)): axum::Extension<CurrentUser>,
    Json(payload): Json<LoginHistoryRequest>,
) -> Result<Json<ApiResponse<Vec<AuthLogDto>>>, ApiError> {
    if !user.is_admin {
        return Err(ApiError::forbidden("Admin access required"));
    }

    if state
        .store()
        .get_user_by_id(payload.user_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("User does not exist.".to_string()));
    }

    let entries = state.store().auth_log_for_user(payload.user_id).await?;

    Ok(Json(ApiResponse::success(
        entries.into_iter().map(AuthLogDto::from).collect(),
    )))
}
