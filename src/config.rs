use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub db_statement_timeout_ms: u64,
    pub payment: PaymentConfig,
    /// Prefix of payment references, `{site_id}-{epoch_millis}-{order_id}`.
    pub site_id: String,
    pub order_number_prefix: String,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub base_url: String,
    pub secret_key: String,
    pub callback_url: String,
    pub timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let db_statement_timeout_ms = env::var("DB_STATEMENT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5000);

        Ok(Self {
            port,
            database_url,
            host,
            db_max_connections,
            db_statement_timeout_ms,
            payment: PaymentConfig::from_env(),
            site_id: env::var("SITE_ID").unwrap_or_else(|_| "MKT".to_string()),
            order_number_prefix: env::var("ORDER_NUMBER_PREFIX")
                .unwrap_or_else(|_| "ORD".to_string()),
        })
    }
}

impl PaymentConfig {
    pub fn from_env() -> Self {
        let base_url = env::var("PAYMENT_BASE_URL")
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());
        let secret_key = env::var("PAYMENT_SECRET_KEY").unwrap_or_default();
        if secret_key.is_empty() {
            tracing::warn!("PAYMENT_SECRET_KEY is not set; gateway calls will be rejected");
        }
        let callback_url = env::var("PAYMENT_CALLBACK_URL").unwrap_or_else(|_| {
            "http://localhost:3000/api/orders/verify-payment".to_string()
        });
        let timeout_secs = env::var("PAYMENT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(15);

        Self {
            base_url,
            secret_key,
            callback_url,
            timeout_secs,
        }
    }
}
