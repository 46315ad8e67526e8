//! Order-side payment flow: starting a gateway charge, verifying a reference
//! and applying gateway webhooks. Gateway calls never run inside a database
//! transaction; the result is applied afterwards under row locks, so a
//! reference confirmed twice (callback and webhook racing) is applied once.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, IntoActiveModel,
    QueryFilter, QuerySelect, Set, TransactionTrait,
    ActiveValue::NotSet,
    sea_query::LockType,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{PAYMENT_METHOD_GATEWAY, PaymentVerification, WebhookAck},
    entity::{
        orders::{Entity as Orders, Model as OrderModel},
        payment_transactions::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as PaymentTransactions,
            Model as PaymentModel,
        },
        sea_orm_active_enums::{OrderStatus, PaymentStatus, TransactionStatus, TransactionType},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    notify,
    payment::{InitializeRequest, PaymentInit, Verification, build_reference, to_minor_units},
    response::{ApiResponse, Meta},
    services::{order_service::user_email, order_state},
    state::AppState,
};

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-paystack-signature";
const CHARGE_SUCCESS: &str = "charge.success";

/// Result of applying a gateway answer to a stored reference.
#[derive(Debug)]
pub struct Settlement {
    pub order: OrderModel,
    pub transaction: PaymentModel,
    pub gateway_status: String,
    pub already_verified: bool,
    pub confirmed: bool,
}

/// Initialize a gateway charge for the order total and record a pending
/// transaction under a fresh reference.
pub async fn start_payment(
    state: &AppState,
    order: &OrderModel,
) -> AppResult<(OrderModel, PaymentInit)> {
    let email = user_email(&state.orm, order.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let amount = to_minor_units(order.total_amount)
        .ok_or_else(|| AppError::BadRequest("order total out of range".into()))?;
    let reference = build_reference(
        &state.config.site_id,
        Utc::now().timestamp_millis(),
        order.id,
    );

    let init = state
        .gateway
        .initialize(InitializeRequest {
            email,
            amount,
            reference: reference.clone(),
            callback_url: state.config.payment.callback_url.clone(),
            metadata: json!({
                "order_id": order.id,
                "order_number": order.order_number,
            }),
        })
        .await
        .map_err(|err| AppError::Payment(err.to_string()))?;

    let txn = state.orm.begin().await?;
    let locked = lock_order(&txn, order.id).await?;
    PaymentActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(locked.user_id),
        order_id: Set(locked.id),
        transaction_type: Set(TransactionType::Payment),
        amount: Set(locked.total_amount),
        status: Set(TransactionStatus::Pending),
        reference: Set(Some(reference.clone())),
        gateway_response: Set(None),
        description: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut active = locked.clone().into_active_model();
    active.payment_reference = Set(Some(reference.clone()));
    if locked.payment_status == PaymentStatus::Failed {
        active.payment_status = Set(PaymentStatus::Pending);
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(order_id = %updated.id, reference = %reference, "payment initialized");
    Ok((updated, init))
}

/// Start a new payment attempt for an order whose payment is still open or
/// failed.
pub async fn retry_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<PaymentInit>> {
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .filter(|o| o.user_id == user.user_id)
        .ok_or(AppError::NotFound)?;

    if order.status == OrderStatus::Cancelled
        || !matches!(order.payment_status, PaymentStatus::Pending | PaymentStatus::Failed)
    {
        return Err(AppError::BadRequest("order is not awaiting payment".into()));
    }
    if order.payment_method != PAYMENT_METHOD_GATEWAY {
        return Err(AppError::BadRequest(format!(
            "order is paid by {}",
            order.payment_method
        )));
    }

    let (_, init) = start_payment(state, &order).await?;
    Ok(ApiResponse::success(
        "Payment initialized",
        init,
        Some(Meta::empty()),
    ))
}

pub async fn verify_payment(
    state: &AppState,
    user: &AuthUser,
    reference: &str,
) -> AppResult<ApiResponse<PaymentVerification>> {
    let transaction = find_by_reference(state, reference)
        .await?
        .ok_or(AppError::NotFound)?;
    let order = Orders::find_by_id(transaction.order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::NotFound);
    }

    if transaction.status == TransactionStatus::Success {
        return Ok(verification_response(Settlement {
            order,
            transaction,
            gateway_status: "success".into(),
            already_verified: true,
            confirmed: false,
        }));
    }

    let verification = match state.gateway.verify(reference).await {
        Ok(verification) => verification,
        Err(err) => {
            tracing::warn!(reference, error = %err, "payment verification failed");
            settle(
                state,
                reference,
                Verification {
                    success: false,
                    gateway_status: "unreachable".into(),
                    amount: None,
                    raw: json!({ "error": err.to_string() }),
                },
            )
            .await?;
            return Err(AppError::Payment(err.to_string()));
        }
    };

    let settlement = settle(state, reference, verification).await?;
    if settlement.transaction.status != TransactionStatus::Success {
        return Err(AppError::Payment(format!(
            "payment was not successful: {}",
            settlement.gateway_status
        )));
    }
    Ok(verification_response(settlement))
}

fn verification_response(settlement: Settlement) -> ApiResponse<PaymentVerification> {
    let message = if settlement.already_verified {
        "Payment already verified"
    } else {
        "Payment verified"
    };
    ApiResponse::success(
        message,
        PaymentVerification {
            order: settlement.order.into(),
            transaction: settlement.transaction.into(),
            gateway_status: settlement.gateway_status,
            already_verified: settlement.already_verified,
        },
        Some(Meta::empty()),
    )
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    reference: String,
    status: Option<String>,
    amount: Option<i64>,
}

/// Apply a signed gateway event. Anything other than a well-formed
/// `charge.success` for a known reference is acknowledged and ignored.
pub async fn handle_webhook(
    state: &AppState,
    signature: Option<&str>,
    body: &[u8],
) -> AppResult<WebhookAck> {
    let signature =
        signature.ok_or_else(|| AppError::Unauthorized("Missing webhook signature".into()))?;
    if !state.gateway.verify_signature(body, signature) {
        return Err(AppError::Unauthorized("Invalid webhook signature".into()));
    }

    let ignored = WebhookAck {
        received: true,
        applied: false,
    };
    let event: WebhookEvent = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "unreadable webhook payload");
            return Ok(ignored);
        }
    };
    if event.event != CHARGE_SUCCESS {
        tracing::debug!(event = %event.event, "webhook event ignored");
        return Ok(ignored);
    }

    let reference = event.data.reference;
    if find_by_reference(state, &reference).await?.is_none() {
        tracing::warn!(reference = %reference, "webhook for unknown reference");
        return Ok(ignored);
    }

    let gateway_status = event.data.status.unwrap_or_else(|| "success".into());
    let raw = serde_json::from_slice::<Value>(body).unwrap_or(Value::Null);
    let settlement = settle(
        state,
        &reference,
        Verification {
            success: gateway_status == "success",
            gateway_status,
            amount: event.data.amount,
            raw,
        },
    )
    .await?;

    Ok(WebhookAck {
        received: true,
        applied: settlement.confirmed,
    })
}

/// Apply a gateway answer to the transaction behind `reference`. Runs with
/// the order row and then the transaction row locked, the same order every
/// order-side path takes; a reference already marked successful is left
/// untouched.
pub async fn settle(
    state: &AppState,
    reference: &str,
    verification: Verification,
) -> AppResult<Settlement> {
    let txn = state.orm.begin().await?;
    let order_id = PaymentTransactions::find()
        .filter(PaymentCol::Reference.eq(reference))
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?
        .order_id;
    let order = lock_order(&txn, order_id).await?;
    let transaction = PaymentTransactions::find()
        .filter(PaymentCol::Reference.eq(reference))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if transaction.status == TransactionStatus::Success {
        txn.commit().await?;
        return Ok(Settlement {
            order,
            transaction,
            gateway_status: verification.gateway_status,
            already_verified: true,
            confirmed: false,
        });
    }

    let expected = to_minor_units(transaction.amount);
    let amount_matches = verification
        .amount
        .is_none_or(|charged| Some(charged) == expected);

    let now = Utc::now();
    let mut tx_active = transaction.clone().into_active_model();
    tx_active.gateway_response = Set(Some(verification.raw.clone()));
    tx_active.updated_at = Set(now.into());

    if verification.success && amount_matches {
        tx_active.status = Set(TransactionStatus::Success);
        let transaction = tx_active.update(&txn).await?;
        let applied = order_state::confirm_payment(&txn, order).await?;
        txn.commit().await?;

        tracing::info!(order_id = %applied.order.id, reference, "payment confirmed");
        audit::record(
            &state.pool,
            Some(applied.order.user_id),
            "payment_confirmed",
            "payment_transactions",
            json!({ "order_id": applied.order.id, "reference": reference }),
        )
        .await;
        notify::dispatch(state.notifier.as_ref(), applied.notifications).await;

        return Ok(Settlement {
            order: applied.order,
            transaction,
            gateway_status: verification.gateway_status,
            already_verified: false,
            confirmed: true,
        });
    }

    let description = if amount_matches {
        format!("gateway status {}", verification.gateway_status)
    } else {
        format!(
            "amount mismatch: charged {:?}, expected {:?}",
            verification.amount, expected
        )
    };
    tracing::warn!(order_id = %order.id, reference, %description, "payment not confirmed");
    tx_active.status = Set(TransactionStatus::Failed);
    tx_active.description = Set(Some(description));
    let transaction = tx_active.update(&txn).await?;

    let definitive = verification.is_definitive_failure() || !amount_matches;
    let order = if definitive && order.payment_status == PaymentStatus::Pending {
        let mut active = order.into_active_model();
        active.payment_status = Set(PaymentStatus::Failed);
        active.updated_at = Set(now.into());
        active.update(&txn).await?
    } else {
        order
    };
    txn.commit().await?;

    Ok(Settlement {
        order,
        transaction,
        gateway_status: verification.gateway_status,
        already_verified: false,
        confirmed: false,
    })
}

async fn find_by_reference(state: &AppState, reference: &str) -> AppResult<Option<PaymentModel>> {
    Ok(PaymentTransactions::find()
        .filter(PaymentCol::Reference.eq(reference))
        .filter(PaymentCol::TransactionType.eq(TransactionType::Payment))
        .one(&state.orm)
        .await?)
}

async fn lock_order(txn: &DatabaseTransaction, id: Uuid) -> AppResult<OrderModel> {
    Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)
}
