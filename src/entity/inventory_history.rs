use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::StockChangeType;

/// Append-only stock ledger. Exactly one of `inventory_id` and
/// `variant_combination_id` is set.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "inventory_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub inventory_id: Option<Uuid>,
    pub variant_combination_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub change_amount: i32,
    pub change_type: StockChangeType,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory::Entity",
        from = "Column::InventoryId",
        to = "super::inventory::Column::Id"
    )]
    Inventory,
    #[sea_orm(
        belongs_to = "super::variant_combinations::Entity",
        from = "Column::VariantCombinationId",
        to = "super::variant_combinations::Column::Id"
    )]
    VariantCombinations,
}

impl Related<super::inventory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Inventory.def()
    }
}

impl Related<super::variant_combinations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VariantCombinations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
