use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::LockType,
};
use uuid::Uuid;

use crate::{
    dto::{
        cart::{CartLine, CartSummary},
        orders::{CreateOrderFromCartRequest, ItemSpec, OrderItemInput, OrderPlacement},
    },
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{Column as CartCol, Entity as Carts},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    services::{
        order_service::{self, CreateOrderParams, normalize_payment_method},
        stock_ledger::{self, StockUnit},
    },
    state::AppState,
};

/// Read a user's cart as stored. `None` when the user never had a cart.
pub async fn load_cart_summary<C>(conn: &C, user_id: Uuid) -> AppResult<Option<CartSummary>>
where
    C: ConnectionTrait,
{
    let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::CreatedAt)
        .order_by_asc(CartItemCol::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(|item| CartLine {
            product_id: item.product_id,
            quantity: item.quantity,
            variant_combination_id: item.variant_combination_id,
            product_variant_id: item.product_variant_id,
            price: item.price,
        })
        .collect();

    Ok(Some(CartSummary {
        cart_id: cart.id,
        user_id: cart.user_id,
        items,
        total_amount: cart.total_amount,
    }))
}

/// Turn a cart snapshot into order-assembler input. Ownership is checked
/// against the live cart row, and every line is re-validated against current
/// product state; prices recorded in the cart are ignored.
pub async fn convert_cart_to_order(
    txn: &DatabaseTransaction,
    user: &AuthUser,
    summary: &CartSummary,
    payload: CreateOrderFromCartRequest,
) -> AppResult<CreateOrderParams> {
    if summary.items.is_empty() {
        return Err(AppError::EmptyCart);
    }
    if summary.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let cart = Carts::find_by_id(summary.cart_id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::EmptyCart)?;
    if cart.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let mut items = Vec::with_capacity(summary.items.len());
    let mut wanted: HashMap<StockUnit, i32> = HashMap::new();
    for line in &summary.items {
        let product = Products::find_by_id(line.product_id)
            .one(txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or(AppError::ProductNotFound(line.product_id))?;

        let spec = ItemSpec::try_from(OrderItemInput {
            product_id: product.id,
            quantity: line.quantity,
            variant_id: line.product_variant_id,
            combination_id: line.variant_combination_id,
        })?;

        let unit = match line.variant_combination_id {
            Some(id) => StockUnit::Combination(id),
            None => StockUnit::Product(product.id),
        };
        let requested = wanted.entry(unit).or_insert(0);
        *requested = requested
            .checked_add(line.quantity)
            .ok_or_else(|| AppError::BadRequest(format!("quantity too large for {unit}")))?;
        let available = stock_ledger::available(txn, unit)
            .await?
            .ok_or(AppError::VariantNotFound {
                product_id: product.id,
                variant_id: line.variant_combination_id.unwrap_or(product.id),
            })?;
        if *requested > available {
            return Err(AppError::InsufficientStock {
                unit: unit.to_string(),
                requested: *requested,
                available,
            });
        }

        items.push(spec);
    }

    Ok(CreateOrderParams {
        user_id: user.user_id,
        address_id: payload.address_id,
        items,
        shipping_cost: payload.shipping_cost,
        tax_amount: payload.tax_amount,
        notes: payload.notes,
        payment_method: normalize_payment_method(payload.payment_method)?,
    })
}

async fn clear_cart(txn: &DatabaseTransaction, cart_id: Uuid) -> AppResult<()> {
    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart_id))
        .exec(txn)
        .await?;

    if let Some(cart) = Carts::find_by_id(cart_id).one(txn).await? {
        let mut active = cart.into_active_model();
        active.total_amount = Set(Decimal::ZERO);
        active.updated_at = Set(Utc::now().into());
        active.update(txn).await?;
    }
    Ok(())
}

/// Place an order from the caller's cart. The order and the emptied cart
/// commit together.
pub async fn create_order_from_cart(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderFromCartRequest,
) -> AppResult<ApiResponse<OrderPlacement>> {
    let txn = state.orm.begin().await?;
    let summary = load_cart_summary(&txn, user.user_id)
        .await?
        .ok_or(AppError::EmptyCart)?;

    let params = convert_cart_to_order(&txn, user, &summary, payload).await?;
    let placed = order_service::place_order(&txn, &state.config, &params).await?;
    clear_cart(&txn, summary.cart_id).await?;
    txn.commit().await?;

    tracing::info!(order_id = %placed.order.id, cart_id = %summary.cart_id, "cart converted to order");
    let placement = order_service::after_commit(state, placed).await;
    Ok(ApiResponse::success(
        "Order created",
        placement,
        Some(Meta::empty()),
    ))
}
