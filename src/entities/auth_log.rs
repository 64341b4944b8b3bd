use sea_orm::entity::prelude::*;

/// One row per established session. A null `logout_time` marks the
/// session as still active.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "auth_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    /// Username snapshot at login time (renames are unsupported).
    pub username: String,

    pub login_time: String,

    pub logout_time: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
