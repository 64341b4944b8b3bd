use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::mfa_credentials;

pub struct MfaRepository {
    conn: DatabaseConnection,
}

impl MfaRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_secret(&self, username: &str) -> Result<Option<String>> {
        let cred = mfa_credentials::Entity::find()
            .filter(mfa_credentials::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query MFA credential")?;

        Ok(cred.map(|c| c.secret))
    }

    /// Store a fresh secret for a user, replacing any pending one. Secrets are
    /// immutable rows, so replacement is delete-then-insert rather than update.
    pub async fn replace_secret(&self, username: &str, secret: &str) -> Result<()> {
        mfa_credentials::Entity::delete_many()
            .filter(mfa_credentials::Column::Username.eq(username))
            .exec(&self.conn)
            .await
            .context("Failed to clear previous MFA credential")?;

        let active = mfa_credentials::ActiveModel {
            username: Set(username.to_string()),
            secret: Set(secret.to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };
        active
            .insert(&self.conn)
            .await
            .context("Failed to insert MFA credential")?;

        Ok(())
    }

    /// Delete the credential for a user. Returns how many rows were removed.
    pub async fn delete(&self, username: &str) -> Result<u64> {
        let res = mfa_credentials::Entity::delete_many()
            .filter(mfa_credentials::Column::Username.eq(username))
            .exec(&self.conn)
            .await
            .context("Failed to delete MFA credential")?;

        Ok(res.rows_affected)
    }
}
