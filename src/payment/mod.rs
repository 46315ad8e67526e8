//! Payment gateway boundary.
//!
//! The order core only depends on [`PaymentGateway`]; the concrete HTTP client
//! lives in [`paystack`]. Amounts cross this boundary in the gateway's minor
//! currency unit.

pub mod paystack;

use async_trait::async_trait;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

pub use paystack::PaystackGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected request: {0}")]
    Rejected(String),

    #[error("malformed gateway response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub email: String,
    /// Amount in minor units (kobo, cents).
    pub amount: i64,
    pub reference: String,
    pub callback_url: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentInit {
    pub authorization_url: String,
    pub reference: String,
}

/// Outcome of asking the gateway about a reference.
#[derive(Debug, Clone)]
pub struct Verification {
    pub success: bool,
    /// Raw gateway status, e.g. `success`, `failed`, `abandoned`.
    pub gateway_status: String,
    /// Charged amount in minor units, when reported.
    pub amount: Option<i64>,
    pub raw: Value,
}

impl Verification {
    /// The gateway reports a terminal failure, not merely an unfinished charge.
    pub fn is_definitive_failure(&self) -> bool {
        matches!(self.gateway_status.as_str(), "failed" | "reversed")
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: InitializeRequest) -> Result<PaymentInit, GatewayError>;

    async fn verify(&self, reference: &str) -> Result<Verification, GatewayError>;

    /// Check a webhook body against the signature header the gateway sent with it.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;
}

/// Convert a two-decimal amount into the gateway's minor unit.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED).round().to_i64()
}

/// Build the per-attempt reference `{site_id}-{epoch_millis}-{order_id}`.
pub fn build_reference(site_id: &str, epoch_millis: i64, order_id: uuid::Uuid) -> String {
    format!("{site_id}-{epoch_millis}-{order_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn minor_units_are_exact_for_two_decimal_amounts() {
        let amount = Decimal::from_str("22000.00").unwrap();
        assert_eq!(to_minor_units(amount), Some(2_200_000));

        let amount = Decimal::from_str("19.99").unwrap();
        assert_eq!(to_minor_units(amount), Some(1999));
    }

    #[test]
    fn reference_embeds_site_time_and_order() {
        let order_id = uuid::Uuid::nil();
        let reference = build_reference("MKT", 1_700_000_000_000, order_id);
        assert_eq!(
            reference,
            "MKT-1700000000000-00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn only_terminal_statuses_count_as_failure() {
        let make = |status: &str| Verification {
            success: false,
            gateway_status: status.to_string(),
            amount: None,
            raw: Value::Null,
        };
        assert!(make("failed").is_definitive_failure());
        assert!(!make("abandoned").is_definitive_failure());
        assert!(!make("ongoing").is_definitive_failure());
    }
}
