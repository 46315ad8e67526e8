use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, DbBackend,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
    TransactionTrait,
    ActiveValue::NotSet,
    sea_query::Expr,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    audit,
    config::AppConfig,
    dto::orders::{
        CreateOrderRequest, ItemSpec, OrderList, OrderPlacement, OrderWithItems,
        PAYMENT_METHOD_GATEWAY, PAYMENT_METHOD_ON_DELIVERY, VariantSelection,
    },
    entity::{
        addresses::{Column as AddressCol, Entity as Addresses},
        order_details::{ActiveModel as OrderDetailActive, Column as OrderDetailCol, Entity as OrderDetails, Model as OrderDetailModel},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        payment_transactions::{Column as PaymentCol, Entity as PaymentTransactions},
        product_variants::Entity as ProductVariants,
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        sea_orm_active_enums::{ItemStatus, OrderStatus, PaymentStatus},
        users::Entity as Users,
        variant_combinations::{Column as CombinationCol, Entity as VariantCombinations},
        vendors::{Column as VendorCol, Entity as Vendors},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Order,
    notify::{self, Notification},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        payment_service,
        pricing::{self, ProductPrice},
        stock_ledger::{self, Attribution, StockUnit},
    },
    state::AppState,
};

/// Typed input of the order assembler, shared by the HTTP handler and the
/// cart conversion flow.
#[derive(Debug, Clone)]
pub struct CreateOrderParams {
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub items: Vec<ItemSpec>,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
    pub notes: Option<String>,
    pub payment_method: String,
}

impl CreateOrderParams {
    pub fn from_request(user_id: Uuid, req: CreateOrderRequest) -> AppResult<Self> {
        if req.items.is_empty() {
            return Err(AppError::EmptyOrder);
        }
        let items = req
            .items
            .into_iter()
            .map(ItemSpec::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            user_id,
            address_id: req.address_id,
            items,
            shipping_cost: req.shipping_cost,
            tax_amount: req.tax_amount,
            notes: req.notes,
            payment_method: normalize_payment_method(req.payment_method)?,
        })
    }
}

pub fn normalize_payment_method(method: Option<String>) -> AppResult<String> {
    let method = method
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| PAYMENT_METHOD_GATEWAY.to_string());
    match method.as_str() {
        PAYMENT_METHOD_GATEWAY | PAYMENT_METHOD_ON_DELIVERY => Ok(method),
        other => Err(AppError::BadRequest(format!(
            "unsupported payment method {other}"
        ))),
    }
}

/// A validated, priced line ready to be written.
#[derive(Debug, Clone)]
struct PricedLine {
    product_id: Uuid,
    vendor_id: Uuid,
    quantity: i32,
    unit: StockUnit,
    combination_id: Option<Uuid>,
    variant_id: Option<Uuid>,
    unit_price: Decimal,
    sub_total: Decimal,
    selected_variants: Option<Value>,
}

/// The committed order aggregate.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    pub detail: OrderDetailModel,
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderPlacement>> {
    let params = CreateOrderParams::from_request(user.user_id, payload)?;

    let txn = state.orm.begin().await?;
    let placed = place_order(&txn, &state.config, &params).await?;
    txn.commit().await?;

    let placement = after_commit(state, placed).await;
    Ok(ApiResponse::success(
        "Order created",
        placement,
        Some(Meta::empty()),
    ))
}

/// Validate, price and persist an order inside `txn`, reserving stock for
/// every line. Nothing is visible to other transactions until the caller
/// commits, and any error leaves the caller to drop (roll back) `txn`.
pub async fn place_order(
    txn: &DatabaseTransaction,
    config: &AppConfig,
    params: &CreateOrderParams,
) -> AppResult<PlacedOrder> {
    if params.items.is_empty() {
        return Err(AppError::EmptyOrder);
    }
    if params.shipping_cost.is_sign_negative() || params.tax_amount.is_sign_negative() {
        return Err(AppError::BadRequest(
            "shipping_cost and tax_amount must not be negative".into(),
        ));
    }

    let address = Addresses::find_by_id(params.address_id)
        .filter(AddressCol::UserId.eq(params.user_id))
        .one(txn)
        .await?;
    if address.is_none() {
        return Err(AppError::AddressNotFound(params.address_id));
    }

    let mut lines = Vec::with_capacity(params.items.len());
    let mut requested: HashMap<StockUnit, i32> = HashMap::new();
    for spec in &params.items {
        let line = price_line(txn, spec).await?;

        let wanted = requested.entry(line.unit).or_insert(0);
        *wanted = wanted
            .checked_add(line.quantity)
            .ok_or_else(|| AppError::BadRequest(format!("quantity too large for {}", line.unit)))?;
        let available = stock_ledger::available(txn, line.unit)
            .await?
            .ok_or(AppError::VariantNotFound {
                product_id: line.product_id,
                variant_id: line.combination_id.unwrap_or(line.product_id),
            })?;
        if *wanted > available {
            return Err(AppError::InsufficientStock {
                unit: line.unit.to_string(),
                requested: *wanted,
                available,
            });
        }

        lines.push(line);
    }

    let total_amount = pricing::order_total(
        lines.iter().map(|line| line.sub_total),
        params.shipping_cost,
        params.tax_amount,
    );

    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let order_seq = next_order_seq(txn).await?;
    let order_number = build_order_number(&config.order_number_prefix, now, order_seq);

    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(params.user_id),
        order_seq: Set(order_seq),
        order_number: Set(order_number.clone()),
        order_date: Set(now.into()),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Pending),
        payment_status: Set(PaymentStatus::Pending),
        payment_method: Set(params.payment_method.clone()),
        payment_reference: Set(None),
        paid_at: Set(None),
        carrier: Set(None),
        tracking_number: Set(None),
        shipped_at: Set(None),
        delivered_at: Set(None),
        cancelled_by: Set(None),
        cancelled_at: Set(None),
        cancellation_reason: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;

    // Lock stock rows in a fixed order, and before any order_items insert
    // takes a key-share lock on them, so two orders over the same units
    // cannot deadlock each other.
    let mut reservations: Vec<(StockUnit, i32)> =
        lines.iter().map(|line| (line.unit, line.quantity)).collect();
    reservations.sort_by_key(|(unit, _)| *unit);
    for (unit, quantity) in reservations {
        stock_ledger::reserve(
            txn,
            unit,
            quantity,
            Attribution {
                actor_id: Some(params.user_id),
                order_id: Some(order.id),
                note: Some(&order_number),
            },
        )
        .await?;
    }

    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            vendor_id: Set(line.vendor_id),
            variant_combination_id: Set(line.combination_id),
            product_variant_id: Set(line.variant_id),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
            sub_total: Set(line.sub_total),
            selected_variants: Set(line.selected_variants.clone()),
            status: Set(ItemStatus::Processing),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(txn)
        .await?;
        items.push(item);
    }

    let detail = OrderDetailActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        address_id: Set(params.address_id),
        shipping_cost: Set(params.shipping_cost),
        tax_amount: Set(params.tax_amount),
        note: Set(params.notes.clone()),
        created_at: NotSet,
    }
    .insert(txn)
    .await?;

    let mut sold: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in &lines {
        *sold.entry(line.product_id).or_insert(0) += line.quantity;
    }
    for (product_id, quantity) in sold {
        Products::update_many()
            .col_expr(ProdCol::SoldUnits, Expr::col(ProdCol::SoldUnits).add(quantity))
            .filter(ProdCol::Id.eq(product_id))
            .exec(txn)
            .await?;
    }

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        total = %order.total_amount,
        lines = items.len(),
        "order placed"
    );

    Ok(PlacedOrder {
        order,
        items,
        detail,
    })
}

async fn price_line(txn: &DatabaseTransaction, spec: &ItemSpec) -> AppResult<PricedLine> {
    let product = Products::find_by_id(spec.product_id)
        .one(txn)
        .await?
        .filter(|p| p.is_active)
        .ok_or(AppError::ProductNotFound(spec.product_id))?;
    let vendor_id = product
        .vendor_id
        .ok_or(AppError::VendorMissing(product.id))?;

    let tracked_by_combinations = VariantCombinations::find()
        .filter(CombinationCol::ProductId.eq(product.id))
        .filter(CombinationCol::IsActive.eq(true))
        .count(txn)
        .await?
        > 0;

    let price = product_price(&product);
    let mut line = PricedLine {
        product_id: product.id,
        vendor_id,
        quantity: spec.quantity,
        unit: StockUnit::Product(product.id),
        combination_id: None,
        variant_id: None,
        unit_price: pricing::line_unit_price(price, &[]),
        sub_total: Decimal::ZERO,
        selected_variants: None,
    };

    match spec.selection {
        VariantSelection::None => {
            if tracked_by_combinations {
                return Err(AppError::InvalidItemSpec {
                    product_id: product.id,
                    reason: "a variant combination must be selected".into(),
                });
            }
        }
        VariantSelection::Legacy(variant_id) => {
            if tracked_by_combinations {
                return Err(AppError::InvalidItemSpec {
                    product_id: product.id,
                    reason: "product is sold by variant combination".into(),
                });
            }
            let variant = ProductVariants::find_by_id(variant_id)
                .one(txn)
                .await?
                .filter(|v| v.product_id == product.id)
                .ok_or(AppError::VariantNotFound {
                    product_id: product.id,
                    variant_id,
                })?;
            line.variant_id = Some(variant.id);
            line.unit_price = pricing::line_unit_price(price, &[variant.additional_price]);
            line.selected_variants = Some(json!({
                "variant_id": variant.id,
                "name": variant.name,
                "value": variant.value,
                "additional_price": variant.additional_price,
            }));
        }
        VariantSelection::Combination(combination_id) => {
            let combination = VariantCombinations::find_by_id(combination_id)
                .one(txn)
                .await?
                .filter(|c| c.product_id == product.id && c.is_active)
                .ok_or(AppError::VariantNotFound {
                    product_id: product.id,
                    variant_id: combination_id,
                })?;
            line.unit = StockUnit::Combination(combination.id);
            line.combination_id = Some(combination.id);
            line.unit_price = pricing::line_unit_price(price, &[combination.price_modifier]);
            line.selected_variants = Some(json!({
                "combination_id": combination.id,
                "combination_name": combination.combination_name,
                "attributes": combination.attributes,
                "price_modifier": combination.price_modifier,
            }));
        }
    }

    if line.unit_price.is_sign_negative() {
        return Err(AppError::InvalidItemSpec {
            product_id: product.id,
            reason: "price modifiers bring the unit price below zero".into(),
        });
    }
    line.sub_total = pricing::line_sub_total(line.unit_price, line.quantity);
    Ok(line)
}

pub fn product_price(product: &ProductModel) -> ProductPrice {
    ProductPrice {
        price: product.price,
        discounted_price: product.discounted_price,
    }
}

/// Best-effort steps once the order is durable: start the payment, write
/// the audit entry and notify the buyer and vendors. Failures become
/// warnings on the response and never touch the committed order.
pub async fn after_commit(state: &AppState, placed: PlacedOrder) -> OrderPlacement {
    let PlacedOrder {
        mut order,
        items,
        detail,
    } = placed;
    let mut warnings = Vec::new();

    audit::record(
        &state.pool,
        Some(order.user_id),
        "order_created",
        "orders",
        json!({ "order_id": order.id, "order_number": order.order_number }),
    )
    .await;

    let mut payment = None;
    if order.payment_method == PAYMENT_METHOD_GATEWAY {
        match payment_service::start_payment(state, &order).await {
            Ok((updated, init)) => {
                order = updated;
                payment = Some(init);
            }
            Err(err) => {
                tracing::warn!(order_id = %order.id, error = %err, "payment initialization failed");
                warnings.push(format!("payment initialization failed: {err}"));
            }
        }
    }

    match placement_notifications(&state.orm, &order, &items).await {
        Ok(notifications) => notify::dispatch(state.notifier.as_ref(), notifications).await,
        Err(err) => {
            tracing::warn!(order_id = %order.id, error = %err, "could not resolve notification recipients");
            warnings.push("order confirmation could not be sent".to_string());
        }
    }

    let payments = PaymentTransactions::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .order_by_asc(PaymentCol::CreatedAt)
        .all(&state.orm)
        .await
        .unwrap_or_default();

    OrderPlacement {
        order: OrderWithItems {
            order: order.into(),
            items: items.into_iter().map(Into::into).collect(),
            detail: Some(detail.into()),
            payments: payments.into_iter().map(Into::into).collect(),
        },
        payment,
        warnings,
    }
}

async fn placement_notifications<C>(
    conn: &C,
    order: &OrderModel,
    items: &[OrderItemModel],
) -> AppResult<Vec<Notification>>
where
    C: ConnectionTrait,
{
    let mut notifications = Vec::new();
    if let Some(email) = user_email(conn, order.user_id).await? {
        notifications.push(Notification::OrderPlaced {
            to: email,
            order_number: order.order_number.clone(),
            total_amount: order.total_amount,
        });
    }

    let mut per_vendor: BTreeMap<Uuid, usize> = BTreeMap::new();
    for item in items {
        *per_vendor.entry(item.vendor_id).or_insert(0) += 1;
    }
    for (vendor_id, item_count) in per_vendor {
        if let Some(email) = vendor_email(conn, vendor_id).await? {
            notifications.push(Notification::VendorOrderReceived {
                to: email,
                order_number: order.order_number.clone(),
                item_count,
            });
        }
    }
    Ok(notifications)
}

pub async fn user_email<C>(conn: &C, user_id: Uuid) -> AppResult<Option<String>>
where
    C: ConnectionTrait,
{
    Ok(Users::find_by_id(user_id).one(conn).await?.map(|u| u.email))
}

pub async fn vendor_email<C>(conn: &C, vendor_id: Uuid) -> AppResult<Option<String>>
where
    C: ConnectionTrait,
{
    let Some(vendor) = Vendors::find_by_id(vendor_id).one(conn).await? else {
        return Ok(None);
    };
    user_email(conn, vendor.user_id).await
}

/// Vendor profile id of a user, if the user sells on the platform.
pub async fn vendor_id_for_user<C>(conn: &C, user_id: Uuid) -> AppResult<Option<Uuid>>
where
    C: ConnectionTrait,
{
    Ok(Vendors::find()
        .filter(VendorCol::UserId.eq(user_id))
        .one(conn)
        .await?
        .map(|v| v.id))
}

/// Allocate the next order sequence number inside the order transaction.
async fn next_order_seq(txn: &DatabaseTransaction) -> AppResult<i64> {
    let row = txn
        .query_one(Statement::from_string(
            DbBackend::Postgres,
            "SELECT nextval('order_number_seq') AS seq",
        ))
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order sequence returned no row")))?;
    Ok(row.try_get::<i64>("", "seq")?)
}

pub fn build_order_number(prefix: &str, at: DateTime<Utc>, seq: i64) -> String {
    format!("{}-{}-{:06}", prefix, at.format("%Y%m%d%H%M%S"), seq)
}

/// Load an order and all of its line items.
pub async fn load_order_with_items<C>(
    conn: &C,
    id: Uuid,
) -> AppResult<Option<(OrderModel, Vec<OrderItemModel>)>>
where
    C: ConnectionTrait,
{
    let Some(order) = Orders::find_by_id(id).one(conn).await? else {
        return Ok(None);
    };
    let items = load_items(conn, order.id).await?;
    Ok(Some((order, items)))
}

pub async fn load_items<C>(conn: &C, order_id: Uuid) -> AppResult<Vec<OrderItemModel>>
where
    C: ConnectionTrait,
{
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .order_by_asc(OrderItemCol::Id)
        .all(conn)
        .await?)
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
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
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Owner and admins see the whole order; a vendor sees only its own lines.
/// Anyone else gets `NotFound`.
pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let (order, items) = load_order_with_items(&state.orm, id)
        .await?
        .ok_or(AppError::NotFound)?;

    let full_view = order.user_id == user.user_id || user.is_admin();
    let items = if full_view {
        items
    } else if user.is_vendor() {
        let vendor_id = vendor_id_for_user(&state.orm, user.user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let own: Vec<_> = items
            .into_iter()
            .filter(|item| item.vendor_id == vendor_id)
            .collect();
        if own.is_empty() {
            return Err(AppError::NotFound);
        }
        own
    } else {
        return Err(AppError::NotFound);
    };

    let detail = OrderDetails::find()
        .filter(OrderDetailCol::OrderId.eq(order.id))
        .one(&state.orm)
        .await?;
    let payments = if full_view {
        PaymentTransactions::find()
            .filter(PaymentCol::OrderId.eq(order.id))
            .order_by_asc(PaymentCol::CreatedAt)
            .all(&state.orm)
            .await?
    } else {
        Vec::new()
    };

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order.into(),
            items: items.into_iter().map(Into::into).collect(),
            detail: detail.map(Into::into),
            payments: payments.into_iter().map(Into::into).collect(),
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_number_pads_sequence() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(build_order_number("ORD", at, 42), "ORD-20260304050607-000042");
        assert_eq!(
            build_order_number("ORD", at, 12_345_678),
            "ORD-20260304050607-12345678"
        );
    }

    #[test]
    fn payment_method_defaults_to_gateway() {
        assert_eq!(normalize_payment_method(None).unwrap(), PAYMENT_METHOD_GATEWAY);
        assert_eq!(
            normalize_payment_method(Some(" Cash_On_Delivery ".into())).unwrap(),
            PAYMENT_METHOD_ON_DELIVERY
        );
        assert!(normalize_payment_method(Some("barter".into())).is_err());
    }

    #[test]
    fn empty_item_list_is_rejected_first() {
        let req = CreateOrderRequest {
            address_id: Uuid::new_v4(),
            items: Vec::new(),
            shipping_cost: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            notes: None,
            payment_method: Some("barter".into()),
        };
        assert!(matches!(
            CreateOrderParams::from_request(Uuid::new_v4(), req),
            Err(AppError::EmptyOrder)
        ));
    }
}
