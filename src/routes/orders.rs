use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CancelOrderRequest, CreateOrderFromCartRequest, CreateOrderRequest, OrderList,
        OrderPlacement, OrderWithItems, PaymentVerification, UpdateItemStatusRequest,
        UpdateOrderStatusRequest, WebhookAck,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    payment::PaymentInit,
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::{
        cart_service, order_service, order_state,
        payment_service::{self, WEBHOOK_SIGNATURE_HEADER},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/from-cart", post(create_order_from_cart))
        .route("/verify-payment/{reference}", get(verify_payment))
        .route("/webhook/payment", post(payment_webhook))
        .route("/items/{id}/status", patch(update_item_status))
        .route("/{id}", get(get_order))
        .route("/{id}/status", patch(update_order_status))
        .route("/{id}/cancel", patch(cancel_order))
        .route("/{id}/payment", post(retry_payment))
}

#[utoipa::path(
    get,
    path = "/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "Orders of the current user", body = ApiResponse<OrderList>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderPlacement>),
        (status = 400, description = "Invalid item, empty order or insufficient stock"),
        (status = 404, description = "Address, product or variant not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<OrderPlacement>>)> {
    let resp = order_service::create_order(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/orders/from-cart",
    request_body = CreateOrderFromCartRequest,
    responses(
        (status = 201, description = "Order placed from the cart", body = ApiResponse<OrderPlacement>),
        (status = 400, description = "Empty cart or insufficient stock"),
        (status = 403, description = "Cart belongs to another user"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderFromCartRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<OrderPlacement>>)> {
    let resp = cart_service::create_order_from_cart(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Invalid transition"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_state::update_order_status(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Order cannot be cancelled"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderRequest>>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let resp = order_state::cancel_order(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/orders/items/{id}/status",
    params(("id" = Uuid, Path, description = "Order item ID")),
    request_body = UpdateItemStatusRequest,
    responses(
        (status = 200, description = "Item status changed", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Invalid transition"),
        (status = 403, description = "Item belongs to another vendor"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_item_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateItemStatusRequest>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_state::update_item_status(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/payment",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "New payment attempt", body = ApiResponse<PaymentInit>),
        (status = 400, description = "Order is not awaiting payment"),
        (status = 402, description = "Gateway rejected the request"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn retry_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PaymentInit>>> {
    let resp = payment_service::retry_payment(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/orders/verify-payment/{reference}",
    params(("reference" = String, Path, description = "Payment reference")),
    responses(
        (status = 200, description = "Payment confirmed", body = ApiResponse<PaymentVerification>),
        (status = 402, description = "Payment not successful or gateway unreachable"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(reference): Path<String>,
) -> AppResult<Json<ApiResponse<PaymentVerification>>> {
    let resp = payment_service::verify_payment(&state, &user, &reference).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/orders/webhook/payment",
    request_body(content = String, description = "Raw gateway event", content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged", body = ApiResponse<WebhookAck>),
        (status = 401, description = "Invalid signature"),
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let ack = payment_service::handle_webhook(&state, signature, &body).await?;
    Ok(Json(ApiResponse::success(
        "Webhook received",
        ack,
        Some(Meta::empty()),
    )))
}
