use sea_orm::entity::prelude::*;

/// At most one row per user. A pending or confirmed TOTP credential;
/// which of the two it is comes from `users.mfa_registered`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "mfa_credentials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    /// Base32-encoded TOTP secret, immutable once written.
    pub secret: String,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
