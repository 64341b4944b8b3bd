use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;

pub mod migrator;
pub mod repositories;

pub use repositories::auth_log::AuthLogEntry;
pub use repositories::spell_check::{NO_MISSPELLED_SENTINEL, Submission};
pub use repositories::user::User;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") && !db_url.contains("memory") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn mfa_repo(&self) -> repositories::mfa::MfaRepository {
        repositories::mfa::MfaRepository::new(self.conn.clone())
    }

    fn auth_log_repo(&self) -> repositories::auth_log::AuthLogRepository {
        repositories::auth_log::AuthLogRepository::new(self.conn.clone())
    }

    fn spell_check_repo(&self) -> repositories::spell_check::SpellCheckRepository {
        repositories::spell_check::SpellCheckRepository::new(self.conn.clone())
    }

    // ========== Users ==========

    /// Seed the admin account from config if it does not exist yet. This is
    /// the only path that sets `is_admin` besides the `create-user` command.
    pub async fn bootstrap_admin(
        &self,
        username: &str,
        password: &str,
        config: &SecurityConfig,
    ) -> Result<()> {
        if self.get_user_by_username(username).await?.is_some() {
            return Ok(());
        }

        if self
            .user_repo()
            .create(username, password, true, config)
            .await?
            .is_some()
        {
            info!("Bootstrapped admin user '{}'", username);
        }

        Ok(())
    }

    /// Returns `Ok(None)` when the username is taken.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
        config: &SecurityConfig,
    ) -> Result<Option<User>> {
        self.user_repo()
            .create(username, password, is_admin, config)
            .await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn update_user_password(
        &self,
        username: &str,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(username, new_password, config)
            .await
    }

    pub async fn set_mfa_registered(&self, username: &str, registered: bool) -> Result<()> {
        self.user_repo()
            .set_mfa_registered(username, registered)
            .await
    }

    // ========== MFA credentials ==========

    pub async fn get_mfa_secret(&self, username: &str) -> Result<Option<String>> {
        self.mfa_repo().get_secret(username).await
    }

    pub async fn replace_mfa_secret(&self, username: &str, secret: &str) -> Result<()> {
        self.mfa_repo().replace_secret(username, secret).await
    }

    pub async fn delete_mfa_secret(&self, username: &str) -> Result<u64> {
        self.mfa_repo().delete(username).await
    }

    // ========== Auth log ==========

    pub async fn open_auth_log(&self, user_id: i32, username: &str) -> Result<i32> {
        self.auth_log_repo().open(user_id, username).await
    }

    pub async fn close_auth_log(&self, id: i32) -> Result<bool> {
        self.auth_log_repo().close(id).await
    }

    pub async fn auth_log_for_user(&self, user_id: i32) -> Result<Vec<AuthLogEntry>> {
        self.auth_log_repo().list_for_user(user_id).await
    }

    // ========== Spell check submissions ==========

    pub async fn record_spell_check(
        &self,
        username: &str,
        submitted_text: &str,
        misspelled_words: &[String],
    ) -> Result<Submission> {
        self.spell_check_repo()
            .record(username, submitted_text, misspelled_words)
            .await
    }

    pub async fn spell_checks_for(&self, username: &str) -> Result<Vec<Submission>> {
        self.spell_check_repo().list_for(username).await
    }

    pub async fn spell_check_count_for(&self, username: &str) -> Result<u64> {
        self.spell_check_repo().count_for(username).await
    }

    pub async fn get_spell_check(&self, id: i32) -> Result<Option<Submission>> {
        self.spell_check_repo().get_by_id(id).await
    }
}
