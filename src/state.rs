use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, CommandSpellChecker, MfaService, SpellChecker};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub mfa: MfaService,

    pub auth: AuthService,

    pub checker: Arc<dyn SpellChecker>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let checker = Arc::new(CommandSpellChecker::new(&config.spellcheck));
        Self::with_checker(config, checker).await
    }

    /// Wire up state with a caller-supplied checker implementation.
    pub async fn with_checker(
        config: Config,
        checker: Arc<dyn SpellChecker>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        store
            .bootstrap_admin(
                &config.admin.username,
                &config.admin.password,
                &config.security,
            )
            .await?;

        let mfa = MfaService::new(store.clone(), config.security.mfa_issuer.clone());
        let auth = AuthService::new(store.clone(), mfa.clone());

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            mfa,
            auth,
            checker,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
