use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::auth_log;

/// One login/logout audit entry.
#[derive(Debug, Clone)]
pub struct AuthLogEntry {
    pub id: i32,
    pub user_id: i32,
    pub username: String,
    pub login_time: String,
    pub logout_time: Option<String>,
}

impl From<auth_log::Model> for AuthLogEntry {
    fn from(model: auth_log::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            username: model.username,
            login_time: model.login_time,
            logout_time: model.logout_time,
        }
    }
}

pub struct AuthLogRepository {
    conn: DatabaseConnection,
}

impl AuthLogRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Record a successful login. Returns the id of the new audit row, which
    /// the session must carry so logout can close exactly this record.
    pub async fn open(&self, user_id: i32, username: &str) -> Result<i32> {
        let active = auth_log::ActiveModel {
            user_id: Set(user_id),
            username: Set(username.to_string()),
            login_time: Set(chrono::Utc::now().to_rfc3339()),
            logout_time: Set(None),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert auth log entry")?;

        Ok(model.id)
    }

    /// Set the logout time on a single audit row. Returns false when the row
    /// does not exist (a corrupted session); the logout time is only ever
    /// written once.
    pub async fn close(&self, id: i32) -> Result<bool> {
        let entry = auth_log::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query auth log entry")?;

        let Some(entry) = entry else {
            return Ok(false);
        };

        if entry.logout_time.is_some() {
            return Ok(true);
        }

        let mut active: auth_log::ActiveModel = entry.into();
        active.logout_time = Set(Some(chrono::Utc::now().to_rfc3339()));
        active
            .update(&self.conn)
            .await
            .context("Failed to close auth log entry")?;

        Ok(true)
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<AuthLogEntry>> {
        let entries = auth_log::Entity::find()
            .filter(auth_log::Column::UserId.eq(user_id))
            .order_by_asc(auth_log::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list auth log entries")?;

        Ok(entries.into_iter().map(AuthLogEntry::from).collect())
    }
}
