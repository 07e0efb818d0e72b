// =============================================================================
// PAYMENT GATEWAY MODULE
// =============================================================================
// Razorpay adapter: creates remote payment intents ("orders" in Razorpay
// terms) for prepaid checkouts and verifies payment callback signatures.
//
// LEARNING NOTES:
// - Credentials are cached with a TTL instead of being read per request
// - Every HTTP call is bounded by the client's timeout
// - Signatures are HMAC-SHA256 over "<order_id>|<payment_id>", compared in
//   constant time
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;

use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};
use crate::metrics;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// GATEWAY SEAM
// =============================================================================

/// Remote payment intent created before the customer pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Gateway-side order identifier (`order_...`)
    pub id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Request a payment intent for `amount_minor` (smallest currency unit).
    async fn create_intent(&self, amount_minor: i64, receipt: &str) -> AppResult<PaymentIntent>;

    /// Check a payment callback signature.
    async fn verify_signature(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
        signature: &str,
    ) -> AppResult<bool>;
}

// =============================================================================
// CREDENTIALS
// =============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct GatewayCredentials {
    pub key_id: String,
    pub key_secret: String,
}

impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

/// Where credentials come from when they are not configured statically.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn load_credentials(&self) -> AppResult<Option<GatewayCredentials>>;
}

/// Credentials with an explicit lifecycle: fixed for the process, or loaded
/// from a source and refreshed once the TTL runs out.
pub enum CredentialCache {
    Static(GatewayCredentials),
    Loaded {
        source: Arc<dyn CredentialSource>,
        ttl: Duration,
        cached: RwLock<Option<(GatewayCredentials, Instant)>>,
    },
}

impl CredentialCache {
    pub fn loaded(source: Arc<dyn CredentialSource>, ttl: Duration) -> Self {
        CredentialCache::Loaded {
            source,
            ttl,
            cached: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> AppResult<GatewayCredentials> {
        let (source, ttl, cached) = match self {
            CredentialCache::Static(credentials) => return Ok(credentials.clone()),
            CredentialCache::Loaded {
                source,
                ttl,
                cached,
            } => (source, *ttl, cached),
        };

        if let Some((credentials, loaded_at)) = cached.read().await.as_ref() {
            if loaded_at.elapsed() < ttl {
                return Ok(credentials.clone());
            }
        }

        let mut slot = cached.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some((credentials, loaded_at)) = slot.as_ref() {
            if loaded_at.elapsed() < ttl {
                return Ok(credentials.clone());
            }
        }

        let credentials = source
            .load_credentials()
            .await?
            .ok_or_else(|| AppError::Upstream("Razorpay keys not configured".to_string()))?;
        tracing::info!(key_id = %credentials.key_id, "Loaded payment gateway credentials");
        *slot = Some((credentials.clone(), Instant::now()));

        Ok(credentials)
    }
}

// =============================================================================
// SIGNATURES
// =============================================================================

/// Hex HMAC-SHA256 of `"<order_id>|<payment_id>"` keyed with the key secret.
pub fn expected_signature(secret: &str, razorpay_order_id: &str, razorpay_payment_id: &str) -> String {
    // HMAC accepts keys of any length, so this never fails
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC can take key of any size"),
    };
    mac.update(razorpay_order_id.as_bytes());
    mac.update(b"|");
    mac.update(razorpay_payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub fn signature_matches(
    secret: &str,
    razorpay_order_id: &str,
    razorpay_payment_id: &str,
    signature: &str,
) -> bool {
    let expected = expected_signature(secret, razorpay_order_id, razorpay_payment_id);
    constant_time_eq(&expected, signature.trim())
}

// =============================================================================
// RAZORPAY CLIENT
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    description: Option<String>,
}

pub struct RazorpayGateway {
    http: reqwest::Client,
    api_base: String,
    currency: String,
    credentials: CredentialCache,
}

impl RazorpayGateway {
    /// Build the client; every request inherits `config.timeout`.
    pub fn new(config: &GatewayConfig, credentials: CredentialCache) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            currency: config.currency.clone(),
            credentials,
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_intent(&self, amount_minor: i64, receipt: &str) -> AppResult<PaymentIntent> {
        let credentials = self.credentials.get().await?;
        let start = Instant::now();

        let response = self
            .http
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&credentials.key_id, Some(&credentials.key_secret))
            .json(&CreateOrderBody {
                amount: amount_minor,
                currency: &self.currency,
                receipt,
            })
            .send()
            .await;
        metrics::record_gateway_call("create_order", start.elapsed().as_secs_f64());

        let response = response?;
        let status = response.status();
        if !status.is_success() {
            let description = response
                .json::<RazorpayErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.description);
            tracing::warn!(status = %status, receipt = %receipt, "Payment intent rejected by gateway");
            return Err(AppError::Upstream(description.unwrap_or_else(|| {
                format!("Payment gateway returned {status}")
            })));
        }

        let order: RazorpayOrder = response.json().await?;
        tracing::info!(
            razorpay_order_id = %order.id,
            amount = amount_minor,
            receipt = %receipt,
            "Payment intent created"
        );

        Ok(PaymentIntent { id: order.id })
    }

    async fn verify_signature(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
        signature: &str,
    ) -> AppResult<bool> {
        let credentials = self.credentials.get().await?;
        Ok(signature_matches(
            &credentials.key_secret,
            razorpay_order_id,
            razorpay_payment_id,
            signature,
        ))
    }
}
