//! Append-only trail of order, payment and inventory actions.

use serde_json::Value;
use uuid::Uuid;

use crate::db::DbPool;

async fn insert(
    pool: &DbPool,
    actor_id: Option<Uuid>,
    action: &str,
    resource: &str,
    metadata: &Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_logs (id, user_id, action, resource, metadata) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(actor_id)
    .bind(action)
    .bind(resource)
    .bind(metadata)
    .execute(pool)
    .await?;
    Ok(())
}

/// Written after the action has committed. A failed write is logged and
/// dropped.
pub async fn record(
    pool: &DbPool,
    actor_id: Option<Uuid>,
    action: &str,
    resource: &str,
    metadata: Value,
) {
    match insert(pool, actor_id, action, resource, &metadata).await {
        Ok(()) => tracing::debug!(action, resource, "audit entry written"),
        Err(err) => tracing::warn!(error = %err, action, resource, "audit log failed"),
    }
}
