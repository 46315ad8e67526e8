//! Paystack-style HTTP gateway client.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha512;
use tracing::{debug, warn};

use super::{GatewayError, InitializeRequest, PaymentGateway, PaymentInit, Verification};
use crate::config::PaymentConfig;

type HmacSha512 = Hmac<Sha512>;

pub struct PaystackGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: Option<i64>,
}

impl PaystackGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<T, GatewayError> {
        if !envelope.status {
            return Err(GatewayError::Rejected(envelope.message));
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::Malformed("missing data".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize(&self, request: InitializeRequest) -> Result<PaymentInit, GatewayError> {
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "payment initialize returned server error");
            return Err(GatewayError::Rejected(format!("HTTP {status}")));
        }

        let envelope: Envelope<InitializeData> = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let data = Self::unwrap_envelope(envelope)?;

        debug!(reference = %data.reference, "payment initialized");
        Ok(PaymentInit {
            authorization_url: data.authorization_url,
            reference: data.reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<Verification, GatewayError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Rejected(format!("HTTP {status}")));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let envelope: Envelope<VerifyData> = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let data = Self::unwrap_envelope(envelope)?;

        Ok(Verification {
            success: data.status == "success",
            gateway_status: data.status,
            amount: data.amount,
            raw,
        })
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        verify_hmac_sha512(&self.secret_key, payload, signature)
    }
}

/// Constant-time check of a hex HMAC-SHA512 signature over `payload`.
pub fn verify_hmac_sha512(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_matching_signature() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign("sk_test", body);
        assert!(verify_hmac_sha512("sk_test", body, &signature));
    }

    #[test]
    fn rejects_tampered_body_or_wrong_key() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign("sk_test", body);
        assert!(!verify_hmac_sha512("sk_test", br#"{"event":"charge.failed"}"#, &signature));
        assert!(!verify_hmac_sha512("other", body, &signature));
        assert!(!verify_hmac_sha512("sk_test", body, "not-hex"));
    }

    #[test]
    fn empty_secret_never_verifies() {
        let body = b"{}";
        let signature = sign("", body);
        assert!(!verify_hmac_sha512("", body, &signature));
    }

    #[test]
    fn rejected_envelope_surfaces_gateway_message() {
        let envelope: Envelope<InitializeData> = serde_json::from_value(serde_json::json!({
            "status": false,
            "message": "Invalid key",
        }))
        .unwrap();
        match PaystackGateway::unwrap_envelope(envelope) {
            Err(GatewayError::Rejected(message)) => assert_eq!(message, "Invalid key"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
