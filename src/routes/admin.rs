use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use uuid::Uuid;

use crate::{
    dto::{
        inventory::{HistoryQuery, InventoryAdjustRequest, InventoryHistoryList, StockLevel},
        orders::OrderList,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::admin_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_all_orders))
        .route("/inventory/products/{id}", patch(adjust_product_stock))
        .route("/inventory/combinations/{id}", patch(adjust_combination_stock))
        .route("/inventory/history", get(inventory_history))
}

#[utoipa::path(
    get,
    path = "/admin/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
    (status = 200, description = "Get all orders (admin only)", body = ApiResponse<OrderList>),
    (status = 403, description = "Forbidden"),
    (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = admin_service::list_all_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/admin/inventory/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = InventoryAdjustRequest,
    responses(
        (status = 200, description = "Adjust flat product stock", body = ApiResponse<StockLevel>),
        (status = 400, description = "Delta is zero or stock would go negative"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn adjust_product_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<InventoryAdjustRequest>,
) -> AppResult<Json<ApiResponse<StockLevel>>> {
    let resp = admin_service::adjust_product_stock(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/admin/inventory/combinations/{id}",
    params(("id" = Uuid, Path, description = "Variant combination ID")),
    request_body = InventoryAdjustRequest,
    responses(
        (status = 200, description = "Adjust combination stock", body = ApiResponse<StockLevel>),
        (status = 400, description = "Delta is zero or stock would go negative"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn adjust_combination_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<InventoryAdjustRequest>,
) -> AppResult<Json<ApiResponse<StockLevel>>> {
    let resp = admin_service::adjust_combination_stock(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/admin/inventory/history",
    params(
        ("product_id" = Option<Uuid>, Query, description = "Flat inventory of this product"),
        ("combination_id" = Option<Uuid>, Query, description = "Variant combination"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Stock movements, oldest first", body = ApiResponse<InventoryHistoryList>),
        (status = 400, description = "Exactly one unit filter is required"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn inventory_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ApiResponse<InventoryHistoryList>>> {
    let resp = admin_service::inventory_history(&state, &user, query).await?;
    Ok(Json(resp))
}
