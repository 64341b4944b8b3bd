use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::spell_checks;

/// Stored when the checker finds nothing, so "checked, clean" is
/// distinguishable from an empty or absent result downstream.
pub const NO_MISSPELLED_SENTINEL: &str = "No misspelled words were found.";

#[derive(Debug, Clone)]
pub struct Submission {
    pub id: i32,
    pub username: String,
    pub submitted_text: String,
    pub misspelled_words: String,
}

impl From<spell_checks::Model> for Submission {
    fn from(model: spell_checks::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            submitted_text: model.submitted_text,
            misspelled_words: model.misspelled_words,
        }
    }
}

pub struct SpellCheckRepository {
    conn: DatabaseConnection,
}

impl SpellCheckRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Persist one immutable submission row. The checker's output is stored
    /// verbatim, joined with ", "; an empty list becomes the sentinel.
    pub async fn record(
        &self,
        username: &str,
        submitted_text: &str,
        misspelled_words: &[String],
    ) -> Result<Submission> {
        let stored = if misspelled_words.is_empty() {
            NO_MISSPELLED_SENTINEL.to_string()
        } else {
            misspelled_words.join(", ")
        };

        let active = spell_checks::ActiveModel {
            username: Set(username.to_string()),
            submitted_text: Set(submitted_text.to_string()),
            misspelled_words: Set(stored),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert spell check submission")?;

        Ok(model.into())
    }

    pub async fn list_for(&self, username: &str) -> Result<Vec<Submission>> {
        let rows = spell_checks::Entity::find()
            .filter(spell_checks::Column::Username.eq(username))
            .order_by_asc(spell_checks::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list spell check submissions")?;

        Ok(rows.into_iter().map(Submission::from).collect())
    }

    pub async fn count_for(&self, username: &str) -> Result<u64> {
        let count = spell_checks::Entity::find()
            .filter(spell_checks::Column::Username.eq(username))
            .count(&self.conn)
            .await
            .context("Failed to count spell check submissions")?;

        Ok(count)
    }

    /// Pure lookup; owner/admin authorization is the caller's concern.
    pub async fn get_by_id(&self, id: i32) -> Result<Option<Submission>> {
        let row = spell_checks::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query spell check submission")?;

        Ok(row.map(Submission::from))
    }
}
