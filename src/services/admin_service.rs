use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        inventory::{HistoryQuery, InventoryAdjustRequest, InventoryHistoryList, StockLevel},
        orders::OrderList,
    },
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        products::Entity as Products,
        variant_combinations::Entity as VariantCombinations,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Order,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::stock_ledger::{self, Attribution, StockUnit},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders: Vec<Order> = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let meta = Meta::new(page, limit, total);

    Ok(ApiResponse::success("Orders", OrderList { items: orders }, Some(meta)))
}

/// Correct the flat inventory of a product that is not sold by combination.
pub async fn adjust_product_stock(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<StockLevel>> {
    ensure_admin(user)?;
    if Products::find_by_id(product_id).one(&state.orm).await?.is_none() {
        return Err(AppError::ProductNotFound(product_id));
    }
    adjust(state, user, StockUnit::Product(product_id), payload).await
}

pub async fn adjust_combination_stock(
    state: &AppState,
    user: &AuthUser,
    combination_id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<StockLevel>> {
    ensure_admin(user)?;
    if VariantCombinations::find_by_id(combination_id)
        .one(&state.orm)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound);
    }
    adjust(state, user, StockUnit::Combination(combination_id), payload).await
}

async fn adjust(
    state: &AppState,
    user: &AuthUser,
    unit: StockUnit,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<StockLevel>> {
    let txn = state.orm.begin().await?;
    let movement = stock_ledger::adjust(
        &txn,
        unit,
        payload.delta,
        Attribution {
            actor_id: Some(user.user_id),
            order_id: None,
            note: payload.note.as_deref(),
        },
    )
    .await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "inventory_adjust",
        "inventory",
        serde_json::json!({
            "unit": unit.to_string(),
            "delta": payload.delta,
            "new_stock": movement.new_stock,
        }),
    )
    .await;

    let (product_id, combination_id) = match unit {
        StockUnit::Product(id) => (Some(id), None),
        StockUnit::Combination(id) => (None, Some(id)),
    };
    Ok(ApiResponse::success(
        "Inventory updated",
        StockLevel {
            product_id,
            combination_id,
            previous_stock: movement.previous_stock,
            stock: movement.new_stock,
        },
        Some(Meta::empty()),
    ))
}

pub async fn inventory_history(
    state: &AppState,
    user: &AuthUser,
    query: HistoryQuery,
) -> AppResult<ApiResponse<InventoryHistoryList>> {
    ensure_admin(user)?;
    let unit = match (query.product_id, query.combination_id) {
        (Some(id), None) => StockUnit::Product(id),
        (None, Some(id)) => StockUnit::Combination(id),
        _ => {
            return Err(AppError::BadRequest(
                "exactly one of product_id and combination_id is required".into(),
            ));
        }
    };

    let (page, limit, offset) = query.pagination().normalize();
    let (rows, total) = stock_ledger::history(&state.orm, unit, limit as u64, offset as u64).await?;

    Ok(ApiResponse::success(
        "Inventory history",
        InventoryHistoryList {
            items: rows.into_iter().map(Into::into).collect(),
        },
        Some(Meta::new(page, limit, total as i64)),
    ))
}
