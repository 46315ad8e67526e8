use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Snapshot of a user's cart as read from storage. Prices here are the ones
/// recorded when lines were added and are never trusted for ordering.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartSummary {
    pub cart_id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub variant_combination_id: Option<Uuid>,
    pub product_variant_id: Option<Uuid>,
    pub price: Decimal,
}
