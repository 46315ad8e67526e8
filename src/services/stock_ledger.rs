//! Authoritative stock counters and their append-only history.
//!
//! Every mutation locks the counter row (`SELECT ... FOR NO KEY UPDATE`) inside the
//! caller's transaction, writes the new value and appends one
//! `inventory_history` row with `previous_stock + change_amount = new_stock`.
//! A concurrent transaction touching the same unit blocks on the lock and
//! re-reads the committed value.

use std::fmt;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
    ActiveValue::NotSet,
    sea_query::{LockType, OnConflict},
};
use uuid::Uuid;

use crate::{
    entity::{
        inventory::{ActiveModel as InventoryActive, Column as InventoryCol, Entity as Inventory, Model as InventoryModel},
        inventory_history::{ActiveModel as HistoryActive, Column as HistoryCol, Entity as InventoryHistory, Model as HistoryModel},
        sea_orm_active_enums::StockChangeType,
        variant_combinations::{ActiveModel as CombinationActive, Entity as VariantCombinations, Model as CombinationModel},
    },
    error::{AppError, AppResult},
};

/// An addressable stock counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StockUnit {
    /// Flat inventory row of a product without purchasable combinations.
    Product(Uuid),
    Combination(Uuid),
}

impl fmt::Display for StockUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockUnit::Product(id) => write!(f, "product {id}"),
            StockUnit::Combination(id) => write!(f, "combination {id}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StockMovement {
    pub unit: StockUnit,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub history: HistoryModel,
}

/// Who and what a ledger entry is attributed to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attribution<'a> {
    pub actor_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub note: Option<&'a str>,
}

/// Decrement `unit` by `quantity` for a sale. Fails with `InsufficientStock`
/// and leaves the counter untouched when fewer than `quantity` units remain.
pub async fn reserve(
    txn: &DatabaseTransaction,
    unit: StockUnit,
    quantity: i32,
    attribution: Attribution<'_>,
) -> AppResult<StockMovement> {
    ensure_positive(quantity)?;
    apply(txn, unit, -quantity, StockChangeType::Sale, attribution).await
}

/// Put `quantity` units back after a cancellation.
pub async fn release(
    txn: &DatabaseTransaction,
    unit: StockUnit,
    quantity: i32,
    attribution: Attribution<'_>,
) -> AppResult<StockMovement> {
    ensure_positive(quantity)?;
    apply(txn, unit, quantity, StockChangeType::Return, attribution).await
}

/// Manual correction by a signed delta.
pub async fn adjust(
    txn: &DatabaseTransaction,
    unit: StockUnit,
    delta: i32,
    attribution: Attribution<'_>,
) -> AppResult<StockMovement> {
    if delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }
    apply(txn, unit, delta, StockChangeType::Adjustment, attribution).await
}

/// Unlocked read, for fail-fast validation before the write phase. A product
/// without an inventory row has zero stock.
pub async fn available<C>(conn: &C, unit: StockUnit) -> AppResult<Option<i32>>
where
    C: sea_orm::ConnectionTrait,
{
    let stock = match unit {
        StockUnit::Product(product_id) => Inventory::find()
            .filter(InventoryCol::ProductId.eq(product_id))
            .one(conn)
            .await?
            .map(|row| row.stock)
            .or(Some(0)),
        StockUnit::Combination(id) => VariantCombinations::find_by_id(id)
            .one(conn)
            .await?
            .map(|row| row.stock),
    };
    Ok(stock)
}

pub async fn history<C>(
    conn: &C,
    unit: StockUnit,
    limit: u64,
    offset: u64,
) -> AppResult<(Vec<HistoryModel>, u64)>
where
    C: sea_orm::ConnectionTrait,
{
    let finder = match unit {
        StockUnit::Product(product_id) => {
            let inventory = Inventory::find()
                .filter(InventoryCol::ProductId.eq(product_id))
                .one(conn)
                .await?;
            let Some(inventory) = inventory else {
                return Ok((Vec::new(), 0));
            };
            InventoryHistory::find().filter(HistoryCol::InventoryId.eq(inventory.id))
        }
        StockUnit::Combination(id) => {
            InventoryHistory::find().filter(HistoryCol::VariantCombinationId.eq(id))
        }
    }
    .order_by_asc(HistoryCol::CreatedAt);

    let total = finder.clone().count(conn).await?;
    let rows = finder.limit(limit).offset(offset).all(conn).await?;
    Ok((rows, total))
}

fn ensure_positive(quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be greater than 0".into()));
    }
    Ok(())
}

async fn apply(
    txn: &DatabaseTransaction,
    unit: StockUnit,
    delta: i32,
    change_type: StockChangeType,
    attribution: Attribution<'_>,
) -> AppResult<StockMovement> {
    let now = Utc::now();
    let counter = match unit {
        StockUnit::Product(product_id) => Counter::Inventory(lock_inventory(txn, product_id).await?),
        StockUnit::Combination(id) => Counter::Combination(
            VariantCombinations::find_by_id(id)
                .lock(LockType::NoKeyUpdate)
                .one(txn)
                .await?
                .ok_or(AppError::NotFound)?,
        ),
    };

    let previous_stock = counter.stock();
    let new_stock = previous_stock
        .checked_add(delta)
        .ok_or_else(|| AppError::BadRequest("stock overflow".into()))?;
    if new_stock < 0 {
        let label = counter.label();
        return Err(match change_type {
            StockChangeType::Sale => AppError::InsufficientStock {
                unit: label,
                requested: -delta,
                available: previous_stock,
            },
            _ => AppError::BadRequest(format!("stock for {label} cannot be negative")),
        });
    }

    let (inventory_id, combination_id) = match &counter {
        Counter::Inventory(row) => {
            InventoryActive {
                id: Set(row.id),
                stock: Set(new_stock),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .update(txn)
            .await?;
            (Some(row.id), None)
        }
        Counter::Combination(row) => {
            CombinationActive {
                id: Set(row.id),
                stock: Set(new_stock),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .update(txn)
            .await?;
            (None, Some(row.id))
        }
    };

    let history = HistoryActive {
        id: Set(Uuid::new_v4()),
        inventory_id: Set(inventory_id),
        variant_combination_id: Set(combination_id),
        order_id: Set(attribution.order_id),
        change_amount: Set(delta),
        change_type: Set(change_type),
        previous_stock: Set(previous_stock),
        new_stock: Set(new_stock),
        note: Set(attribution.note.map(str::to_string)),
        actor_id: Set(attribution.actor_id),
        created_at: NotSet,
    }
    .insert(txn)
    .await?;

    tracing::debug!(
        unit = %unit,
        previous_stock,
        new_stock,
        change = delta,
        "stock updated"
    );

    Ok(StockMovement {
        unit,
        previous_stock,
        new_stock,
        history,
    })
}

enum Counter {
    Inventory(InventoryModel),
    Combination(CombinationModel),
}

impl Counter {
    fn stock(&self) -> i32 {
        match self {
            Counter::Inventory(row) => row.stock,
            Counter::Combination(row) => row.stock,
        }
    }

    fn label(&self) -> String {
        match self {
            Counter::Inventory(row) => format!("product {}", row.product_id),
            Counter::Combination(row) => format!("combination {}", row.combination_name),
        }
    }
}

/// Lock the product's inventory row, creating an empty one first if the
/// product has never had a stock event.
async fn lock_inventory(txn: &DatabaseTransaction, product_id: Uuid) -> AppResult<InventoryModel> {
    Inventory::insert(InventoryActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        stock: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    })
    .on_conflict(
        OnConflict::column(InventoryCol::ProductId)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(txn)
    .await?;

    Inventory::find()
        .filter(InventoryCol::ProductId.eq(product_id))
        .lock(LockType::NoKeyUpdate)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_order_products_before_combinations() {
        let mut units = vec![
            StockUnit::Combination(Uuid::from_u128(1)),
            StockUnit::Product(Uuid::from_u128(2)),
            StockUnit::Product(Uuid::from_u128(1)),
        ];
        units.sort();
        assert_eq!(
            units,
            vec![
                StockUnit::Product(Uuid::from_u128(1)),
                StockUnit::Product(Uuid::from_u128(2)),
                StockUnit::Combination(Uuid::from_u128(1)),
            ]
        );
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert!(ensure_positive(0).is_err());
        assert!(ensure_positive(-2).is_err());
        assert!(ensure_positive(1).is_ok());
    }
}
