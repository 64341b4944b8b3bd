use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use time;

use crate::config::Config;
use crate::services::SpellChecker;
use crate::state::SharedState;

pub mod auth;
mod error;
mod headers;
pub mod spellcheck;
mod types;
pub mod validation;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &crate::services::AuthService {
        &self.shared.auth
    }

    #[must_use]
    pub fn mfa(&self) -> &crate::services::MfaService {
        &self.shared.mfa
    }

    #[must_use]
    pub fn checker(&self) -> &Arc<dyn SpellChecker> {
        &self.shared.checker
    }
}

#[must_use]
pub fn create_app_state(shared: Arc<SharedState>) -> Arc<AppState> {
    Arc::new(AppState { shared })
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared))
}

/// State constructor taking a caller-supplied checker implementation.
pub async fn create_app_state_with_checker(
    config: Config,
    checker: Arc<dyn SpellChecker>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::with_checker(config, checker).await?);
    Ok(create_app_state(shared))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let (secure_cookies, inactivity_minutes) = {
        let config = state.config().read().await;
        (
            config.server.secure_cookies,
            config.server.session_inactivity_minutes,
        )
    };

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            inactivity_minutes,
        )));

    let protected_routes = create_protected_router(state.clone());

    Router::new()
        .merge(protected_routes)
        .route("/", get(auth::index))
        .route("/register", get(auth::register_form))
        .route("/register", post(auth::register))
        .route("/login", get(auth::login_form))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout))
        .layer(session_layer)
        .layer(middleware::from_fn(headers::security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/account", get(auth::account))
        .route("/account", post(auth::update_account))
        .route("/multifactor", get(auth::multifactor))
        .route("/multifactor", post(auth::confirm_multifactor))
        .route("/qrcode", get(auth::qrcode))
        .route("/login_history", get(auth::login_history))
        .route("/login_history", post(auth::query_login_history))
        .route("/spell_check", get(spellcheck::spell_check_form))
        .route("/spell_check", post(spellcheck::spell_check))
        .route("/history", get(spellcheck::history))
        .route("/history", post(spellcheck::query_history))
        .route("/history/query/{id}", get(spellcheck::get_submission))
        .route_layer(middleware::from_fn_with_state(state, auth::require_login))
}
