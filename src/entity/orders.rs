use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total: Decimal,
    pub status: String,
    pub payment_method: String,
    #[sea_orm(unique)]
    pub payment_transaction_id: Option<String>,
    #[sea_orm(unique)]
    pub external_order_id: Option<String>,
    pub customer_email: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::download_grants::Entity")]
    DownloadGrants,
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::download_grants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DownloadGrants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
