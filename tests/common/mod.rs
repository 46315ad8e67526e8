#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use axum_marketplace_api::{
    config::{AppConfig, PaymentConfig},
    db::{create_orm_conn, create_pool},
    entity::{
        addresses::ActiveModel as AddressActive,
        inventory::ActiveModel as InventoryActive,
        product_variants::ActiveModel as VariantActive,
        products::ActiveModel as ProductActive,
        users::ActiveModel as UserActive,
        variant_combinations::ActiveModel as CombinationActive,
        vendors::ActiveModel as VendorActive,
    },
    middleware::auth::AuthUser,
    notify::{Notification, Notifier},
    payment::{
        GatewayError, InitializeRequest, PaymentGateway, PaymentInit, Verification,
        paystack::verify_hmac_sha512,
    },
    state::AppState,
};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, Set};
use serde_json::json;
use sha2::Sha512;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "sk_test_webhook";

/// Gateway double: remembers initialized references and answers `verify`
/// with a configurable status.
pub struct MockGateway {
    pub verify_status: Mutex<String>,
    pub amount_override: Mutex<Option<i64>>,
    pub fail_initialize: AtomicBool,
    pub unreachable: AtomicBool,
    pub verify_calls: AtomicUsize,
    initialized: Mutex<HashMap<String, i64>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            verify_status: Mutex::new("success".into()),
            amount_override: Mutex::new(None),
            fail_initialize: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            verify_calls: AtomicUsize::new(0),
            initialized: Mutex::new(HashMap::new()),
        }
    }
}

impl MockGateway {
    pub fn set_status(&self, status: &str) {
        *self.verify_status.lock().unwrap() = status.to_string();
    }

    pub fn calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initialize(&self, request: InitializeRequest) -> Result<PaymentInit, GatewayError> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("initialize disabled".into()));
        }
        self.initialized
            .lock()
            .unwrap()
            .insert(request.reference.clone(), request.amount);
        Ok(PaymentInit {
            authorization_url: format!("https://checkout.test/{}", request.reference),
            reference: request.reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<Verification, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("HTTP 503".into()));
        }
        let status = self.verify_status.lock().unwrap().clone();
        let amount = self
            .amount_override
            .lock()
            .unwrap()
            .or_else(|| self.initialized.lock().unwrap().get(reference).copied());
        Ok(Verification {
            success: status == "success",
            gateway_status: status.clone(),
            amount,
            raw: json!({ "status": true, "data": { "status": status, "reference": reference } }),
        })
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        verify_hmac_sha512(WEBHOOK_SECRET, payload, signature)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Notification) -> bool,
    {
        self.sent.lock().unwrap().iter().filter(|n| predicate(n)).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Build an app against the test database, or `None` when no database is
/// configured.
pub async fn setup() -> anyhow::Result<Option<TestApp>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(None);
        }
    };

    let config = AppConfig {
        database_url,
        host: "127.0.0.1".into(),
        port: 0,
        db_max_connections: 5,
        db_statement_timeout_ms: 5000,
        payment: PaymentConfig {
            base_url: "http://gateway.invalid".into(),
            secret_key: WEBHOOK_SECRET.into(),
            callback_url: "http://localhost/verify".into(),
            timeout_secs: 1,
        },
        site_id: "TST".into(),
        order_number_prefix: "TST".into(),
    };

    let pool = create_pool(&config).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let gateway = Arc::new(MockGateway::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState {
        orm: create_orm_conn(&pool),
        pool,
        config: Arc::new(config),
        gateway: gateway.clone(),
        notifier: notifier.clone(),
    };

    Ok(Some(TestApp {
        state,
        gateway,
        notifier,
    }))
}

pub fn sign(payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

pub async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    UserActive {
        id: Set(id),
        email: Set(format!("{role}-{id}@example.com")),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: id,
        role: role.into(),
    })
}

/// A vendor profile plus the user account behind it.
pub async fn create_vendor(state: &AppState) -> anyhow::Result<(AuthUser, Uuid)> {
    let user = create_user(state, "vendor").await?;
    let vendor = VendorActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        business_name: Set(format!("Shop {}", user.user_id)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok((user, vendor.id))
}

pub async fn create_address(state: &AppState, user: &AuthUser) -> anyhow::Result<Uuid> {
    let address = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        line1: Set("1 Crab Lane".into()),
        city: Set("Lagos".into()),
        state: Set(None),
        country: Set("NG".into()),
        postal_code: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(address.id)
}

pub async fn create_product(
    state: &AppState,
    vendor_id: Option<Uuid>,
    price: Decimal,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    ProductActive {
        id: Set(id),
        vendor_id: Set(vendor_id),
        name: Set(format!("Product {id}")),
        description: Set(None),
        price: Set(price),
        discounted_price: Set(None),
        sold_units: Set(0),
        is_active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}

/// Product with flat inventory.
pub async fn create_stocked_product(
    state: &AppState,
    vendor_id: Uuid,
    price: Decimal,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product_id = create_product(state, Some(vendor_id), price).await?;
    InventoryActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        stock: Set(stock),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product_id)
}

pub async fn create_combination(
    state: &AppState,
    product_id: Uuid,
    name: &str,
    price_modifier: Decimal,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let combination = CombinationActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        combination_name: Set(name.into()),
        attributes: Set(json!({ "name": name })),
        price_modifier: Set(price_modifier),
        stock: Set(stock),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(combination.id)
}

/// Single variant priced by `additional_price` on a flat-inventory product.
pub async fn create_variant(
    state: &AppState,
    product_id: Uuid,
    value: &str,
    additional_price: Decimal,
) -> anyhow::Result<Uuid> {
    let variant = VariantActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        name: Set("Size".into()),
        value: Set(value.into()),
        additional_price: Set(additional_price),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(variant.id)
}
