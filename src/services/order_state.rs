//! Order and line-item lifecycle.
//!
//! ```text
//! pending ──► processing ──► shipped ──► delivered
//!    │  └──────────┴──► shipped / delivered
//!    └──────► cancelled ◄── processing
//! ```
//!
//! Every transition runs inside one transaction with the order row locked,
//! so a status change and the stock it releases or the payment it finalizes
//! commit together.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, UpdateMany,
    ActiveValue::NotSet,
    sea_query::{Expr, LockType},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CancelOrderRequest, OrderWithItems, UpdateItemStatusRequest, UpdateOrderStatusRequest},
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{Entity as Orders, Model as OrderModel},
        payment_transactions::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as PaymentTransactions,
        },
        products::{Column as ProdCol, Entity as Products},
        sea_orm_active_enums::{
            ItemStatus, OrderStatus, PaymentStatus, TransactionStatus, TransactionType,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_vendor_or_admin},
    notify::{self, Notification},
    response::{ApiResponse, Meta},
    services::{
        order_service::{load_items, user_email, vendor_id_for_user},
        stock_ledger::{self, Attribution, StockUnit},
    },
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    /// Requested state equals the current one and repeating it is harmless.
    Unchanged,
}

pub fn check_transition(
    from: OrderStatus,
    payment: PaymentStatus,
    to: OrderStatus,
) -> AppResult<Transition> {
    use OrderStatus::*;

    if from == Cancelled && to == Cancelled {
        return Ok(Transition::Unchanged);
    }
    let invalid = || AppError::InvalidTransition { from, to };

    // A failed payment only leaves the order open for cancellation.
    if payment == PaymentStatus::Failed && to != Cancelled {
        return Err(invalid());
    }

    let allowed = match to {
        Pending => false,
        Processing => from == Pending,
        Shipped => matches!(from, Pending | Processing),
        Delivered => matches!(from, Pending | Processing | Shipped),
        Cancelled => matches!(from, Pending | Processing),
    };
    if allowed {
        Ok(Transition::Apply)
    } else {
        Err(invalid())
    }
}

pub fn check_item_transition(from: ItemStatus, to: ItemStatus) -> AppResult<()> {
    match (from, to) {
        (ItemStatus::Processing, ItemStatus::Shipped)
        | (ItemStatus::Processing, ItemStatus::Cancelled) => Ok(()),
        _ => Err(AppError::InvalidItemTransition { from, to }),
    }
}

/// Order status implied by the line items: cancelled when every line is
/// cancelled, otherwise the status shared by all remaining lines.
pub fn uniform_item_status(items: &[OrderItemModel]) -> Option<OrderStatus> {
    let mut open = items.iter().filter(|item| item.status != ItemStatus::Cancelled);
    let Some(first) = open.next() else {
        return (!items.is_empty()).then_some(OrderStatus::Cancelled);
    };
    open.all(|item| item.status == first.status)
        .then(|| first.status.as_order_status())
}

/// Extra data carried by a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionInput {
    pub actor_id: Option<Uuid>,
    pub reason: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

pub struct Applied {
    pub order: OrderModel,
    pub notifications: Vec<Notification>,
}

/// Apply an already-checked transition to a locked order row.
pub async fn apply_transition(
    txn: &DatabaseTransaction,
    order: OrderModel,
    to: OrderStatus,
    input: TransitionInput,
) -> AppResult<Applied> {
    let now = Utc::now();
    let buyer = user_email(txn, order.user_id).await?;
    let mut notifications = Vec::new();
    let mut active = order.clone().into_active_model();
    active.status = Set(to);
    active.updated_at = Set(now.into());

    match to {
        OrderStatus::Pending | OrderStatus::Processing => {}
        OrderStatus::Shipped => {
            active.carrier = Set(input.carrier.clone().or(order.carrier.clone()));
            active.tracking_number =
                Set(input.tracking_number.clone().or(order.tracking_number.clone()));
            active.shipped_at = Set(Some(now.into()));
            mark_open_items(txn, order.id, ItemStatus::Shipped).await?;
            if let Some(to) = buyer {
                notifications.push(Notification::OrderShipped {
                    to,
                    order_number: order.order_number.clone(),
                    carrier: input.carrier,
                    tracking_number: input.tracking_number,
                });
            }
        }
        OrderStatus::Delivered => {
            active.delivered_at = Set(Some(now.into()));
            if order.shipped_at.is_none() {
                active.shipped_at = Set(Some(now.into()));
            }
            mark_open_items(txn, order.id, ItemStatus::Shipped).await?;
            let collected = order.payment_status == PaymentStatus::Pending;
            if collected {
                active.payment_status = Set(PaymentStatus::Paid);
                active.paid_at = Set(Some(now.into()));
                settle_pending_payment(txn, &order).await?;
            }
            if let Some(to) = buyer {
                notifications.push(Notification::OrderDelivered {
                    to: to.clone(),
                    order_number: order.order_number.clone(),
                });
                if collected {
                    notifications.push(Notification::PaymentReceived {
                        to,
                        order_number: order.order_number.clone(),
                        amount: order.total_amount,
                    });
                }
            }
        }
        OrderStatus::Cancelled => {
            let open: Vec<OrderItemModel> = load_items(txn, order.id)
                .await?
                .into_iter()
                .filter(|i| i.status != ItemStatus::Cancelled)
                .collect();
            cancel_items(txn, &open, input.actor_id, &order.order_number).await?;
            if order.payment_status == PaymentStatus::Paid {
                refund_outstanding(txn, &order, input.reason.as_deref()).await?;
            }
            active.cancelled_by = Set(input.actor_id);
            active.cancelled_at = Set(Some(now.into()));
            active.cancellation_reason = Set(input.reason.clone());
            if let Some(to) = buyer {
                notifications.push(Notification::OrderCancelled {
                    to,
                    order_number: order.order_number.clone(),
                    reason: input.reason,
                });
            }
        }
    }

    let order = active.update(txn).await?;
    tracing::info!(order_id = %order.id, status = %order.status, "order status changed");
    Ok(Applied {
        order,
        notifications,
    })
}

/// Record a confirmed payment on a locked order row: mark it paid and move a
/// pending order to processing.
pub async fn confirm_payment(txn: &DatabaseTransaction, order: OrderModel) -> AppResult<Applied> {
    let mut notifications = Vec::new();
    if order.payment_status == PaymentStatus::Paid {
        return Ok(Applied {
            order,
            notifications,
        });
    }

    let now = Utc::now();
    let mut active = order.clone().into_active_model();
    active.payment_status = Set(PaymentStatus::Paid);
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    match order.status {
        OrderStatus::Pending => active.status = Set(OrderStatus::Processing),
        OrderStatus::Cancelled => {
            tracing::warn!(order_id = %order.id, "payment confirmed for a cancelled order");
            refund_outstanding(txn, &order, Some("payment received after cancellation")).await?;
        }
        _ => {}
    }
    let updated = active.update(txn).await?;

    if let Some(to) = user_email(txn, updated.user_id).await? {
        notifications.push(Notification::PaymentConfirmed {
            to,
            order_number: updated.order_number.clone(),
            amount: updated.total_amount,
        });
    }
    Ok(Applied {
        order: updated,
        notifications,
    })
}

async fn mark_open_items(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    status: ItemStatus,
) -> AppResult<()> {
    OrderItems::update_many()
        .col_expr(OrderItemCol::Status, Expr::value(status.to_value()))
        .col_expr(OrderItemCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderItemCol::OrderId.eq(order_id))
        .filter(OrderItemCol::Status.eq(ItemStatus::Processing))
        .exec(txn)
        .await?;
    Ok(())
}

/// Decrement a product's sold units, never below zero.
fn release_sold_units(product_id: Uuid, quantity: i32) -> UpdateMany<Products> {
    Products::update_many()
        .col_expr(
            ProdCol::SoldUnits,
            Expr::cust_with_values("GREATEST(sold_units - $1, 0)", [quantity]),
        )
        .filter(ProdCol::Id.eq(product_id))
}

fn stock_unit(item: &OrderItemModel) -> StockUnit {
    match item.variant_combination_id {
        Some(id) => StockUnit::Combination(id),
        None => StockUnit::Product(item.product_id),
    }
}

/// Put the stock of `items` back and mark them cancelled. Units are released
/// in sorted order, the order placement locks them in, and sold units are
/// decremented per product afterwards. Callers pass only lines that are not
/// cancelled yet, so each line releases its stock at most once.
async fn cancel_items(
    txn: &DatabaseTransaction,
    items: &[OrderItemModel],
    actor_id: Option<Uuid>,
    order_number: &str,
) -> AppResult<()> {
    let mut releases: Vec<(StockUnit, i32, Uuid)> = items
        .iter()
        .map(|item| (stock_unit(item), item.quantity, item.order_id))
        .collect();
    releases.sort_by_key(|(unit, _, _)| *unit);
    for (unit, quantity, order_id) in releases {
        stock_ledger::release(
            txn,
            unit,
            quantity,
            Attribution {
                actor_id,
                order_id: Some(order_id),
                note: Some(order_number),
            },
        )
        .await?;
    }

    let mut sold: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in items {
        *sold.entry(item.product_id).or_insert(0) += item.quantity;
    }
    for (product_id, quantity) in sold {
        release_sold_units(product_id, quantity).exec(txn).await?;
    }

    let ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
    if !ids.is_empty() {
        OrderItems::update_many()
            .col_expr(OrderItemCol::Status, Expr::value(ItemStatus::Cancelled.to_value()))
            .col_expr(OrderItemCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(OrderItemCol::Id.is_in(ids))
            .exec(txn)
            .await?;
    }
    Ok(())
}

async fn settle_pending_payment(txn: &DatabaseTransaction, order: &OrderModel) -> AppResult<()> {
    let pending = PaymentTransactions::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .filter(PaymentCol::TransactionType.eq(TransactionType::Payment))
        .filter(PaymentCol::Status.eq(TransactionStatus::Pending))
        .order_by_desc(PaymentCol::CreatedAt)
        .lock(LockType::Update)
        .one(txn)
        .await?;

    match pending {
        Some(tx) => {
            let mut active = tx.into_active_model();
            active.status = Set(TransactionStatus::Success);
            active.description = Set(Some("settled on delivery".into()));
            active.updated_at = Set(Utc::now().into());
            active.update(txn).await?;
        }
        None => {
            PaymentActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(order.user_id),
                order_id: Set(order.id),
                transaction_type: Set(TransactionType::Payment),
                amount: Set(order.total_amount),
                status: Set(TransactionStatus::Success),
                reference: Set(None),
                gateway_response: Set(None),
                description: Set(Some("collected on delivery".into())),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(txn)
            .await?;
        }
    }
    Ok(())
}

/// Refund whatever part of the order total has not been refunded yet.
async fn refund_outstanding(
    txn: &DatabaseTransaction,
    order: &OrderModel,
    reason: Option<&str>,
) -> AppResult<()> {
    let refunded: Decimal = PaymentTransactions::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .filter(PaymentCol::TransactionType.eq(TransactionType::Refund))
        .all(txn)
        .await?
        .iter()
        .map(|tx| tx.amount)
        .sum();
    let outstanding = order.total_amount - refunded;
    if outstanding > Decimal::ZERO {
        record_refund(txn, order, outstanding, reason).await?;
    }
    Ok(())
}

async fn record_refund(
    txn: &DatabaseTransaction,
    order: &OrderModel,
    amount: Decimal,
    reason: Option<&str>,
) -> AppResult<()> {
    PaymentActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(order.user_id),
        order_id: Set(order.id),
        transaction_type: Set(TransactionType::Refund),
        amount: Set(amount),
        status: Set(TransactionStatus::Pending),
        reference: Set(None),
        gateway_response: Set(None),
        description: Set(reason.map(str::to_string)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;
    tracing::info!(order_id = %order.id, %amount, "refund recorded");
    Ok(())
}

async fn lock_order(txn: &DatabaseTransaction, id: Uuid) -> AppResult<OrderModel> {
    Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)
}

fn respond(
    order: OrderModel,
    items: Vec<OrderItemModel>,
    message: &str,
) -> ApiResponse<OrderWithItems> {
    ApiResponse::success(
        message,
        OrderWithItems {
            order: order.into(),
            items: items.into_iter().map(Into::into).collect(),
            detail: None,
            payments: Vec::new(),
        },
        Some(Meta::empty()),
    )
}

/// Admins may move any order; a vendor only orders made up entirely of its
/// own lines.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_vendor_or_admin(user)?;

    let txn = state.orm.begin().await?;
    let order = lock_order(&txn, id).await?;
    let items = load_items(&txn, order.id).await?;

    if !user.is_admin() {
        let vendor_id = vendor_id_for_user(&txn, user.user_id)
            .await?
            .ok_or(AppError::Forbidden)?;
        if items.is_empty() || items.iter().any(|item| item.vendor_id != vendor_id) {
            return Err(AppError::Forbidden);
        }
    }

    if check_transition(order.status, order.payment_status, payload.status)?
        == Transition::Unchanged
    {
        return Ok(respond(order, items, "Order unchanged"));
    }

    let from = order.status;
    let applied = apply_transition(
        &txn,
        order,
        payload.status,
        TransitionInput {
            actor_id: Some(user.user_id),
            reason: payload.notes,
            carrier: payload.carrier,
            tracking_number: payload.tracking_number,
        },
    )
    .await?;
    let items = load_items(&txn, applied.order.id).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_status_updated",
        "orders",
        json!({ "order_id": applied.order.id, "from": from, "to": applied.order.status }),
    )
    .await;
    notify::dispatch(state.notifier.as_ref(), applied.notifications).await;

    Ok(respond(applied.order, items, "Order status updated"))
}

/// Buyer (or admin) cancellation of a pending or processing order.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;
    let order = lock_order(&txn, id).await?;
    if order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::NotFound);
    }

    if check_transition(order.status, order.payment_status, OrderStatus::Cancelled)?
        == Transition::Unchanged
    {
        let items = load_items(&txn, order.id).await?;
        return Ok(respond(order, items, "Order already cancelled"));
    }

    let applied = apply_transition(
        &txn,
        order,
        OrderStatus::Cancelled,
        TransitionInput {
            actor_id: Some(user.user_id),
            reason: payload.reason,
            ..Default::default()
        },
    )
    .await?;
    let items = load_items(&txn, applied.order.id).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_cancelled",
        "orders",
        json!({ "order_id": applied.order.id }),
    )
    .await;
    notify::dispatch(state.notifier.as_ref(), applied.notifications).await;

    Ok(respond(applied.order, items, "Order cancelled"))
}

/// Move one line item. When all lines end up in the same state the order
/// follows, if that order transition is allowed.
pub async fn update_item_status(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateItemStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_vendor_or_admin(user)?;

    let txn = state.orm.begin().await?;
    let item = OrderItems::find_by_id(item_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if !user.is_admin() {
        let vendor_id = vendor_id_for_user(&txn, user.user_id)
            .await?
            .ok_or(AppError::Forbidden)?;
        if item.vendor_id != vendor_id {
            return Err(AppError::Forbidden);
        }
    }

    let order = lock_order(&txn, item.order_id).await?;
    if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Delivered) {
        return Err(AppError::InvalidItemTransition {
            from: item.status,
            to: payload.status,
        });
    }
    if order.payment_status == PaymentStatus::Failed && payload.status != ItemStatus::Cancelled {
        return Err(AppError::InvalidItemTransition {
            from: item.status,
            to: payload.status,
        });
    }

    // Re-read under the order lock; a concurrent cancel may have moved it.
    let item = OrderItems::find_by_id(item_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    check_item_transition(item.status, payload.status)?;

    match payload.status {
        ItemStatus::Cancelled => {
            cancel_items(
                &txn,
                std::slice::from_ref(&item),
                Some(user.user_id),
                &order.order_number,
            )
            .await?;
            if order.payment_status == PaymentStatus::Paid {
                record_refund(&txn, &order, item.sub_total, Some("line item cancelled")).await?;
            }
        }
        status => {
            let mut active = item.clone().into_active_model();
            active.status = Set(status);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?;
        }
    }

    let mut items = load_items(&txn, order.id).await?;
    let mut notifications = Vec::new();
    let mut order = order;
    if let Some(target) = uniform_item_status(&items) {
        let promotable = target != order.status
            && check_transition(order.status, order.payment_status, target)
                .is_ok_and(|t| t == Transition::Apply);
        if promotable {
            let applied = apply_transition(
                &txn,
                order,
                target,
                TransitionInput {
                    actor_id: Some(user.user_id),
                    reason: payload.notes.clone(),
                    ..Default::default()
                },
            )
            .await?;
            order = applied.order;
            notifications = applied.notifications;
            items = load_items(&txn, order.id).await?;
        }
    }
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_item_status_updated",
        "order_items",
        json!({ "item_id": item_id, "status": payload.status, "order_status": order.status }),
    )
    .await;
    notify::dispatch(state.notifier.as_ref(), notifications).await;

    Ok(respond(order, items, "Item status updated"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    use OrderStatus::*;

    #[test]
    fn forward_transitions_are_allowed() {
        let paid = PaymentStatus::Paid;
        assert_eq!(check_transition(Pending, paid, Processing).unwrap(), Transition::Apply);
        assert_eq!(check_transition(Processing, paid, Shipped).unwrap(), Transition::Apply);
        assert_eq!(check_transition(Pending, paid, Shipped).unwrap(), Transition::Apply);
        assert_eq!(check_transition(Shipped, paid, Delivered).unwrap(), Transition::Apply);
        assert_eq!(check_transition(Pending, paid, Delivered).unwrap(), Transition::Apply);
    }

    #[test]
    fn terminal_states_do_not_move() {
        let paid = PaymentStatus::Paid;
        assert!(check_transition(Delivered, paid, Shipped).is_err());
        assert!(check_transition(Delivered, paid, Cancelled).is_err());
        assert!(check_transition(Cancelled, paid, Processing).is_err());
        assert!(check_transition(Shipped, paid, Cancelled).is_err());
        assert!(check_transition(Processing, paid, Pending).is_err());
        assert!(check_transition(Shipped, paid, Shipped).is_err());
    }

    #[test]
    fn repeated_cancel_is_a_no_op() {
        assert_eq!(
            check_transition(Cancelled, PaymentStatus::Pending, Cancelled).unwrap(),
            Transition::Unchanged
        );
    }

    #[test]
    fn failed_payment_only_allows_cancel() {
        let failed = PaymentStatus::Failed;
        assert!(matches!(
            check_transition(Pending, failed, Shipped),
            Err(AppError::InvalidTransition { from: Pending, to: Shipped })
        ));
        assert_eq!(check_transition(Pending, failed, Cancelled).unwrap(), Transition::Apply);
    }

    #[test]
    fn items_move_only_out_of_processing() {
        assert!(check_item_transition(ItemStatus::Processing, ItemStatus::Shipped).is_ok());
        assert!(check_item_transition(ItemStatus::Processing, ItemStatus::Cancelled).is_ok());
        assert!(check_item_transition(ItemStatus::Shipped, ItemStatus::Cancelled).is_err());
        assert!(check_item_transition(ItemStatus::Cancelled, ItemStatus::Processing).is_err());
        assert!(check_item_transition(ItemStatus::Shipped, ItemStatus::Shipped).is_err());
    }

    fn item(status: ItemStatus) -> OrderItemModel {
        let now = Utc::now().into();
        OrderItemModel {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            product_id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            variant_combination_id: None,
            product_variant_id: None,
            quantity: 1,
            price: Decimal::ONE,
            sub_total: Decimal::ONE,
            selected_variants: None,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn uniform_status_maps_to_order_status() {
        let shipped = vec![item(ItemStatus::Shipped), item(ItemStatus::Shipped)];
        assert_eq!(uniform_item_status(&shipped), Some(Shipped));

        let mixed = vec![item(ItemStatus::Shipped), item(ItemStatus::Processing)];
        assert_eq!(uniform_item_status(&mixed), None);

        let partly_cancelled = vec![item(ItemStatus::Shipped), item(ItemStatus::Cancelled)];
        assert_eq!(uniform_item_status(&partly_cancelled), Some(Shipped));

        let all_cancelled = vec![item(ItemStatus::Cancelled), item(ItemStatus::Cancelled)];
        assert_eq!(uniform_item_status(&all_cancelled), Some(Cancelled));

        assert_eq!(uniform_item_status(&[]), None);
    }

    #[test]
    fn sold_units_release_binds_postgres_placeholders() {
        let product_id = Uuid::new_v4();
        let stmt = release_sold_units(product_id, 3).build(DbBackend::Postgres);
        assert!(!stmt.sql.contains('?'), "{}", stmt.sql);
        assert!(stmt.sql.contains("GREATEST(sold_units - $1, 0)"), "{}", stmt.sql);
        let values = stmt.values.expect("bound values").0;
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], sea_orm::Value::Int(Some(3)));
    }
}
