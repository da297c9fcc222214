use sea_orm::entity::prelude::*;

/// Per-day counter backing order numbers.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "order_sequences")]
pub struct Model {
    /// YYYYMMDD
    #[sea_orm(primary_key, auto_increment = false)]
    pub day: String,
    pub last_value: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
