use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{models::InventoryHistoryEntry, routes::params::Pagination};

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockLevel {
    pub product_id: Option<Uuid>,
    pub combination_id: Option<Uuid>,
    pub previous_stock: i32,
    pub stock: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub product_id: Option<Uuid>,
    pub combination_id: Option<Uuid>,
}

impl HistoryQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryHistoryList {
    pub items: Vec<InventoryHistoryEntry>,
}
