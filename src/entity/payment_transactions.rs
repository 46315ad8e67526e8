use sea_orm::entity::prelude::*;
use serde_json::Value;

use super::sea_orm_active_enums::{TransactionStatus, TransactionType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "payment_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    /// Gateway reference; refunds recorded locally carry none.
    pub reference: Option<String>,
    pub gateway_response: Option<Value>,
    pub description: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::orders::Entity",
        from = "Column::OrderId",
        to = "super::orders::Column::Id"
    )]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
