use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entity::sea_orm_active_enums::{ItemStatus, OrderStatus},
    response::ApiResponse,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Order must contain at least one item")]
    EmptyOrder,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid item for product {product_id}: {reason}")]
    InvalidItemSpec { product_id: Uuid, reason: String },

    #[error("Product {0} has no vendor")]
    VendorMissing(Uuid),

    #[error("Address {0} not found")]
    AddressNotFound(Uuid),

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Variant {variant_id} not found for product {product_id}")]
    VariantNotFound { product_id: Uuid, variant_id: Uuid },

    #[error("Insufficient stock for {unit}: requested {requested}, available {available}")]
    InsufficientStock {
        unit: String,
        requested: i32,
        available: i32,
    },

    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Cannot change item status from {from} to {to}")]
    InvalidItemTransition { from: ItemStatus, to: ItemStatus },

    #[error("Unauthorized {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Payment error: {0}")]
    Payment(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound
            | AppError::AddressNotFound(_)
            | AppError::ProductNotFound(_)
            | AppError::VariantNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::EmptyOrder
            | AppError::EmptyCart
            | AppError::InvalidItemSpec { .. }
            | AppError::VendorMissing(_)
            | AppError::InsufficientStock { .. }
            | AppError::InvalidTransition { .. }
            | AppError::InvalidItemTransition { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable details that let a client retry, e.g. by lowering a quantity.
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::InvalidItemSpec { product_id, reason } => {
                Some(json!({ "product_id": product_id, "reason": reason }))
            }
            AppError::VendorMissing(product_id) | AppError::ProductNotFound(product_id) => {
                Some(json!({ "product_id": product_id }))
            }
            AppError::AddressNotFound(address_id) => Some(json!({ "address_id": address_id })),
            AppError::VariantNotFound {
                product_id,
                variant_id,
            } => Some(json!({ "product_id": product_id, "variant_id": variant_id })),
            AppError::InsufficientStock {
                unit,
                requested,
                available,
            } => Some(json!({
                "unit": unit,
                "requested": requested,
                "available": available,
            })),
            AppError::InvalidTransition { from, to } => {
                Some(json!({ "current": from, "requested": to }))
            }
            AppError::InvalidItemTransition { from, to } => {
                Some(json!({ "current": from, "requested": to }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let body = ApiResponse::<()>::error(self.to_string(), self.details());

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_errors_are_client_errors_with_details() {
        let err = AppError::InsufficientStock {
            unit: "combination Black-M".into(),
            requested: 3,
            available: 2,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let details = err.details().expect("details");
        assert_eq!(details["requested"], 3);
        assert_eq!(details["available"], 2);
    }

    #[test]
    fn transition_errors_name_both_states() {
        let err = AppError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Cannot change order status from shipped to cancelled"
        );
        let details = err.details().expect("details");
        assert_eq!(details["current"], "shipped");
        assert_eq!(details["requested"], "cancelled");
    }

    #[test]
    fn persistence_errors_map_to_500() {
        let err = AppError::OrmError(sea_orm::DbErr::Custom("boom".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.details().is_none());
    }

    #[test]
    fn not_found_variants_map_to_404() {
        assert_eq!(
            AppError::AddressNotFound(Uuid::nil()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }
}
