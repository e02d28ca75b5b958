use anyhow::{Context, Result};
use serde::Deserialize;

/// Gateway events the platform acts on. Everything else is acknowledged and
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentCaptured {
        gateway_order_id: String,
        gateway_payment_id: String,
    },
    PaymentFailed {
        gateway_order_id: String,
        gateway_payment_id: String,
        reason: String,
    },
    Ignored(String),
}

/// Only `event` is typed here. The payload is decoded per event, and only for
/// events we act on.
#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    error_description: Option<String>,
}

fn payment_entity(payload: Option<serde_json::Value>) -> Result<PaymentEntity> {
    let entity = payload
        .as_ref()
        .and_then(|p| p.pointer("/payment/entity"))
        .cloned()
        .context("webhook payment entity missing")?;
    serde_json::from_value(entity).context("webhook payment entity is malformed")
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let env: Envelope = serde_json::from_slice(body).context("webhook body is not valid json")?;

        match env.event.as_str() {
            "payment.captured" => {
                let e = payment_entity(env.payload)?;
                Ok(WebhookEvent::PaymentCaptured {
                    gateway_order_id: e.order_id.context("captured payment has no order_id")?,
                    gateway_payment_id: e.id,
                })
            }
            "payment.failed" => {
                let e = payment_entity(env.payload)?;
                Ok(WebhookEvent::PaymentFailed {
                    gateway_order_id: e.order_id.context("failed payment has no order_id")?,
                    gateway_payment_id: e.id,
                    reason: e
                        .error_description
                        .unwrap_or_else(|| "payment failed".to_string()),
                })
            }
            other => Ok(WebhookEvent::Ignored(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_event_is_parsed() {
        let body = br#"{
            "event": "payment.captured",
            "payload": {"payment": {"entity": {"id": "pay_1", "order_id": "order_9", "status": "captured"}}}
        }"#;
        assert_eq!(
            WebhookEvent::parse(body).unwrap(),
            WebhookEvent::PaymentCaptured {
                gateway_order_id: "order_9".to_string(),
                gateway_payment_id: "pay_1".to_string(),
            }
        );
    }

    #[test]
    fn failed_event_keeps_reason() {
        let body = br#"{
            "event": "payment.failed",
            "payload": {"payment": {"entity": {"id": "pay_2", "order_id": "order_9", "error_description": "card declined"}}}
        }"#;
        match WebhookEvent::parse(body).unwrap() {
            WebhookEvent::PaymentFailed { reason, .. } => assert_eq!(reason, "card declined"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_events_are_ignored() {
        let body = br#"{"event": "refund.processed", "payload": {}}"#;
        assert_eq!(
            WebhookEvent::parse(body).unwrap(),
            WebhookEvent::Ignored("refund.processed".to_string())
        );
    }

    #[test]
    fn unknown_events_with_foreign_payment_shapes_are_ignored() {
        let dispute = br#"{"event":"payment.dispute.created","payload":{"payment":{"x":1}}}"#;
        assert_eq!(
            WebhookEvent::parse(dispute).unwrap(),
            WebhookEvent::Ignored("payment.dispute.created".to_string())
        );

        let paid = br#"{"event":"order.paid","payload":{"payment":{"entity":{"order_id":"order_1"}}}}"#;
        assert_eq!(
            WebhookEvent::parse(paid).unwrap(),
            WebhookEvent::Ignored("order.paid".to_string())
        );
    }

    #[test]
    fn captured_without_entity_is_an_error() {
        assert!(WebhookEvent::parse(br#"{"event": "payment.captured"}"#).is_err());
        assert!(WebhookEvent::parse(b"not json").is_err());
        let no_id = br#"{"event":"payment.captured","payload":{"payment":{"entity":{"order_id":"o"}}}}"#;
        assert!(WebhookEvent::parse(no_id).is_err());
    }
}
