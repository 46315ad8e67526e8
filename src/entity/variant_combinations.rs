use sea_orm::entity::prelude::*;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "variant_combinations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub combination_name: String,
    /// Attribute map such as `{"Color": "Black", "Size": "M"}`.
    pub attributes: Value,
    pub price_modifier: Decimal,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::products::Entity",
        from = "Column::ProductId",
        to = "super::products::Column::Id"
    )]
    Products,
    #[sea_orm(has_many = "super::inventory_history::Entity")]
    InventoryHistory,
}

impl Related<super::products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Products.def()
    }
}

impl Related<super::inventory_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
