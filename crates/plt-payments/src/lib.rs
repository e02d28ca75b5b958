//! Payment gateway integration.
//!
//! Checkout creates an order on the gateway; the storefront collects payment
//! and returns `(gateway_order_id, gateway_payment_id, signature)`. The
//! signature is an HMAC-SHA256 over `"<order_id>|<payment_id>"` keyed with
//! the merchant key secret. Webhooks are signed over the raw request body
//! with a separate webhook secret.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

mod razorpay;
mod signature;
mod webhook;

pub use razorpay::RazorpayGateway;
pub use signature::{
    payment_signature, verify_payment_signature, verify_webhook_signature, webhook_signature,
};
pub use webhook::WebhookEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrderRequest {
    pub amount_minor: i64,
    pub currency: String,
    /// Merchant-side reference; the platform order id.
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Public key id handed to the storefront checkout widget.
    fn key_id(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    async fn create_order(&self, req: GatewayOrderRequest) -> Result<GatewayOrder>;

    fn verify_payment(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str)
        -> bool;

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool;
}

/// Gateway used when online payments are switched off. Cash on delivery
/// still works.
#[derive(Debug, Clone, Default)]
pub struct DisabledGateway;

#[async_trait::async_trait]
impl PaymentGateway for DisabledGateway {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn key_id(&self) -> &str {
        ""
    }

    fn enabled(&self) -> bool {
        false
    }

    async fn create_order(&self, _req: GatewayOrderRequest) -> Result<GatewayOrder> {
        Err(anyhow!("PAYMENTS_DISABLED: online payments are not configured"))
    }

    fn verify_payment(&self, _: &str, _: &str, _: &str) -> bool {
        false
    }

    fn verify_webhook(&self, _: &[u8], _: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_gateway_refuses_everything() {
        let g = DisabledGateway;
        assert!(!g.enabled());
        let err = g
            .create_order(GatewayOrderRequest {
                amount_minor: 100,
                currency: "INR".to_string(),
                receipt: "r".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PAYMENTS_DISABLED"));
        assert!(!g.verify_payment("o", "p", "s"));
        assert!(!g.verify_webhook(b"{}", "s"));
    }
}
