use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::sea_orm_active_enums::{ItemStatus, OrderStatus},
    error::AppError,
    models::{Order, OrderDetail, OrderItem, PaymentTransaction},
    payment::PaymentInit,
};

pub const PAYMENT_METHOD_GATEWAY: &str = "paystack";
pub const PAYMENT_METHOD_ON_DELIVERY: &str = "cash_on_delivery";

/// One requested line as it arrives on the wire. At most one of
/// `variant_id` and `combination_id` may be present.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Single product variant priced by its `additional_price`.
    pub variant_id: Option<Uuid>,
    /// Purchasable variant combination with its own stock.
    pub combination_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantSelection {
    None,
    Legacy(Uuid),
    Combination(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSpec {
    pub product_id: Uuid,
    pub quantity: i32,
    pub selection: VariantSelection,
}

impl TryFrom<OrderItemInput> for ItemSpec {
    type Error = AppError;

    fn try_from(input: OrderItemInput) -> Result<Self, Self::Error> {
        if input.quantity <= 0 {
            return Err(AppError::InvalidItemSpec {
                product_id: input.product_id,
                reason: "quantity must be greater than 0".into(),
            });
        }
        let selection = match (input.variant_id, input.combination_id) {
            (None, None) => VariantSelection::None,
            (Some(variant_id), None) => VariantSelection::Legacy(variant_id),
            (None, Some(combination_id)) => VariantSelection::Combination(combination_id),
            (Some(_), Some(_)) => {
                return Err(AppError::InvalidItemSpec {
                    product_id: input.product_id,
                    reason: "variant_id and combination_id are mutually exclusive".into(),
                });
            }
        };
        Ok(ItemSpec {
            product_id: input.product_id,
            quantity: input.quantity,
            selection,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub address_id: Uuid,
    pub items: Vec<OrderItemInput>,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrderFromCartRequest {
    pub address_id: Uuid,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateItemStatusRequest {
    pub status: ItemStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub detail: Option<OrderDetail>,
    pub payments: Vec<PaymentTransaction>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderPlacement {
    pub order: OrderWithItems,
    pub payment: Option<PaymentInit>,
    /// Post-commit steps that failed without undoing the order.
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentVerification {
    pub order: Order,
    pub transaction: PaymentTransaction,
    pub gateway_status: String,
    /// The reference had already been confirmed; nothing changed.
    pub already_verified: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(variant_id: Option<Uuid>, combination_id: Option<Uuid>, quantity: i32) -> OrderItemInput {
        OrderItemInput {
            product_id: Uuid::new_v4(),
            quantity,
            variant_id,
            combination_id,
        }
    }

    #[test]
    fn selection_follows_which_id_is_present() {
        let id = Uuid::new_v4();
        let spec = ItemSpec::try_from(input(None, None, 1)).unwrap();
        assert_eq!(spec.selection, VariantSelection::None);
        let spec = ItemSpec::try_from(input(Some(id), None, 1)).unwrap();
        assert_eq!(spec.selection, VariantSelection::Legacy(id));
        let spec = ItemSpec::try_from(input(None, Some(id), 2)).unwrap();
        assert_eq!(spec.selection, VariantSelection::Combination(id));
        assert_eq!(spec.quantity, 2);
    }

    #[test]
    fn both_variant_paths_are_rejected() {
        let err = ItemSpec::try_from(input(Some(Uuid::new_v4()), Some(Uuid::new_v4()), 1))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidItemSpec { .. }));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let err = ItemSpec::try_from(input(None, None, 0)).unwrap_err();
        assert!(matches!(err, AppError::InvalidItemSpec { .. }));
    }

    #[test]
    fn request_defaults_money_to_zero() {
        let body = serde_json::json!({
            "address_id": Uuid::nil(),
            "items": [{ "product_id": Uuid::nil(), "quantity": 1 }],
        });
        let req: CreateOrderRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.shipping_cost, Decimal::ZERO);
        assert_eq!(req.tax_amount, Decimal::ZERO);
        assert!(req.items[0].variant_id.is_none());
    }
}
