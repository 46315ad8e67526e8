use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{CartLine, CartSummary},
        inventory::{InventoryAdjustRequest, InventoryHistoryList, StockLevel},
        orders::{
            CancelOrderRequest, CreateOrderFromCartRequest, CreateOrderRequest, OrderItemInput,
            OrderList, OrderPlacement, OrderWithItems, PaymentVerification,
            UpdateItemStatusRequest, UpdateOrderStatusRequest, WebhookAck,
        },
    },
    entity::sea_orm_active_enums::{
        ItemStatus, OrderStatus, PaymentStatus, StockChangeType, TransactionStatus,
        TransactionType,
    },
    models::{InventoryHistoryEntry, Order, OrderDetail, OrderItem, PaymentTransaction},
    payment::PaymentInit,
    response::{ApiResponse, Meta},
    routes::{admin, health, orders, params},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness,
        orders::list_orders,
        orders::create_order,
        orders::create_order_from_cart,
        orders::get_order,
        orders::update_order_status,
        orders::cancel_order,
        orders::update_item_status,
        orders::retry_payment,
        orders::verify_payment,
        orders::payment_webhook,
        admin::list_all_orders,
        admin::adjust_product_stock,
        admin::adjust_combination_stock,
        admin::inventory_history
    ),
    components(
        schemas(
            Order,
            OrderItem,
            OrderDetail,
            PaymentTransaction,
            InventoryHistoryEntry,
            OrderStatus,
            PaymentStatus,
            ItemStatus,
            StockChangeType,
            TransactionType,
            TransactionStatus,
            OrderItemInput,
            CreateOrderRequest,
            CreateOrderFromCartRequest,
            UpdateOrderStatusRequest,
            CancelOrderRequest,
            UpdateItemStatusRequest,
            OrderWithItems,
            OrderList,
            OrderPlacement,
            PaymentInit,
            PaymentVerification,
            WebhookAck,
            CartSummary,
            CartLine,
            InventoryAdjustRequest,
            StockLevel,
            InventoryHistoryList,
            params::Pagination,
            params::OrderListQuery,
            Meta,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<OrderPlacement>,
            ApiResponse<PaymentVerification>,
            ApiResponse<StockLevel>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Orders", description = "Order placement and lifecycle"),
        (name = "Payments", description = "Payment initialization, verification and webhooks"),
        (name = "Admin", description = "Admin order listing and inventory"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
