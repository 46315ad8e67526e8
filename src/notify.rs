//! Buyer and vendor notifications.
//!
//! Delivery (email, push) is an external concern. Notifications are only
//! dispatched after the database transaction that caused them has committed,
//! and a failed dispatch is logged without affecting the request.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    OrderPlaced {
        to: String,
        order_number: String,
        total_amount: Decimal,
    },
    VendorOrderReceived {
        to: String,
        order_number: String,
        item_count: usize,
    },
    PaymentConfirmed {
        to: String,
        order_number: String,
        amount: Decimal,
    },
    OrderShipped {
        to: String,
        order_number: String,
        carrier: Option<String>,
        tracking_number: Option<String>,
    },
    OrderDelivered {
        to: String,
        order_number: String,
    },
    PaymentReceived {
        to: String,
        order_number: String,
        amount: Decimal,
    },
    OrderCancelled {
        to: String,
        order_number: String,
        reason: Option<String>,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::OrderPlaced { to, .. }
            | Notification::VendorOrderReceived { to, .. }
            | Notification::PaymentConfirmed { to, .. }
            | Notification::OrderShipped { to, .. }
            | Notification::OrderDelivered { to, .. }
            | Notification::PaymentReceived { to, .. }
            | Notification::OrderCancelled { to, .. } => to,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log. Used when no delivery channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&notification)?;
        tracing::info!(to = %notification.recipient(), payload = %payload, "notification");
        Ok(())
    }
}

pub async fn dispatch(notifier: &dyn Notifier, notifications: Vec<Notification>) {
    for notification in notifications {
        let to = notification.recipient().to_string();
        if let Err(err) = notifier.send(notification).await {
            tracing::warn!(error = %err, to = %to, "notification failed");
        }
    }
}
