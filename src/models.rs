use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    inventory_history::Model as InventoryHistoryModel,
    order_details::Model as OrderDetailModel,
    order_items::Model as OrderItemModel,
    orders::Model as OrderModel,
    payment_transactions::Model as PaymentTransactionModel,
    sea_orm_active_enums::{
        ItemStatus, OrderStatus, PaymentStatus, StockChangeType, TransactionStatus,
        TransactionType,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub variant_combination_id: Option<Uuid>,
    pub product_variant_id: Option<Uuid>,
    pub quantity: i32,
    pub price: Decimal,
    pub sub_total: Decimal,
    pub selected_variants: Option<Value>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    pub address_id: Uuid,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryHistoryEntry {
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
    pub created_at: DateTime<Utc>,
}

impl From<OrderModel> for Order {
    fn from(model: OrderModel) -> Self {
        Order {
            id: model.id,
            user_id: model.user_id,
            order_number: model.order_number,
            order_date: model.order_date.with_timezone(&Utc),
            total_amount: model.total_amount,
            status: model.status,
            payment_status: model.payment_status,
            payment_method: model.payment_method,
            payment_reference: model.payment_reference,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            carrier: model.carrier,
            tracking_number: model.tracking_number,
            shipped_at: model.shipped_at.map(|dt| dt.with_timezone(&Utc)),
            delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
            cancelled_by: model.cancelled_by,
            cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
            cancellation_reason: model.cancellation_reason,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<OrderItemModel> for OrderItem {
    fn from(model: OrderItemModel) -> Self {
        OrderItem {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            vendor_id: model.vendor_id,
            variant_combination_id: model.variant_combination_id,
            product_variant_id: model.product_variant_id,
            quantity: model.quantity,
            price: model.price,
            sub_total: model.sub_total,
            selected_variants: model.selected_variants,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<OrderDetailModel> for OrderDetail {
    fn from(model: OrderDetailModel) -> Self {
        OrderDetail {
            address_id: model.address_id,
            shipping_cost: model.shipping_cost,
            tax_amount: model.tax_amount,
            note: model.note,
        }
    }
}

impl From<PaymentTransactionModel> for PaymentTransaction {
    fn from(model: PaymentTransactionModel) -> Self {
        PaymentTransaction {
            id: model.id,
            order_id: model.order_id,
            transaction_type: model.transaction_type,
            amount: model.amount,
            status: model.status,
            reference: model.reference,
            description: model.description,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<InventoryHistoryModel> for InventoryHistoryEntry {
    fn from(model: InventoryHistoryModel) -> Self {
        InventoryHistoryEntry {
            id: model.id,
            inventory_id: model.inventory_id,
            variant_combination_id: model.variant_combination_id,
            order_id: model.order_id,
            change_amount: model.change_amount,
            change_type: model.change_type,
            previous_stock: model.previous_stock,
            new_stock: model.new_stock,
            note: model.note,
            actor_id: model.actor_id,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
