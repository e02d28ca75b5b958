use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::signature::{verify_payment_signature, verify_webhook_signature};
use crate::{GatewayOrder, GatewayOrderRequest, PaymentGateway};

/// Razorpay Orders API client.
///
/// Key secret and webhook secret are passed in by the caller; they are never
/// logged and `Debug` redacts them.
#[derive(Clone)]
pub struct RazorpayGateway {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    webhook_secret: Option<String>,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<REDACTED>")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    description: Option<String>,
}

impl RazorpayGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            webhook_secret,
        }
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, req: GatewayOrderRequest) -> Result<GatewayOrder> {
        if req.amount_minor <= 0 {
            return Err(anyhow!(
                "gateway order amount must be positive, got {}",
                req.amount_minor
            ));
        }

        let resp = self
            .http
            .post(self.orders_url())
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateOrderBody {
                amount: req.amount_minor,
                currency: &req.currency,
                receipt: &req.receipt,
            })
            .send()
            .await
            .context("razorpay create order request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body: Option<ErrorEnvelope> = resp.json().await.ok();
            let (code, description) = body
                .and_then(|b| b.error)
                .map(|e| (e.code, e.description))
                .unwrap_or((None, None));
            warn!(
                receipt = %req.receipt,
                status = status.as_u16(),
                "razorpay refused order creation"
            );
            return Err(anyhow!(
                "razorpay http error status={} code={} description={}",
                status.as_u16(),
                code.unwrap_or_else(|| "UNKNOWN".to_string()),
                description.unwrap_or_else(|| "none".to_string())
            ));
        }

        let body: CreateOrderResponse = resp
            .json()
            .await
            .context("razorpay create order json decode failed")?;

        info!(receipt = %req.receipt, gateway_order_id = %body.id, "razorpay order created");

        Ok(GatewayOrder {
            gateway_order_id: body.id,
            amount_minor: body.amount,
            currency: body.currency,
        })
    }

    fn verify_payment(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(&self.key_secret, gateway_order_id, gateway_payment_id, signature)
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        match &self.webhook_secret {
            Some(secret) => verify_webhook_signature(secret, body, signature),
            None => false,
        }
    }
}
