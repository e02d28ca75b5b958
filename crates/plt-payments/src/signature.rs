use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts any key length")
}

fn sign(key: &[u8], data: &[u8]) -> String {
    let mut m = mac(key);
    m.update(data);
    hex::encode(m.finalize().into_bytes())
}

fn verify(key: &[u8], data: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut m = mac(key);
    m.update(data);
    m.verify_slice(&expected).is_ok()
}

fn payment_payload(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    format!("{gateway_order_id}|{gateway_payment_id}")
}

/// Lowercase hex HMAC-SHA256 of `"<order_id>|<payment_id>"`.
pub fn payment_signature(key_secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    sign(
        key_secret.as_bytes(),
        payment_payload(gateway_order_id, gateway_payment_id).as_bytes(),
    )
}

/// Constant-time check. Non-hex or wrong-length signatures are rejected.
pub fn verify_payment_signature(
    key_secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature_hex: &str,
) -> bool {
    if gateway_order_id.is_empty() || gateway_payment_id.is_empty() {
        return false;
    }
    verify(
        key_secret.as_bytes(),
        payment_payload(gateway_order_id, gateway_payment_id).as_bytes(),
        signature_hex,
    )
}

pub fn webhook_signature(webhook_secret: &str, body: &[u8]) -> String {
    sign(webhook_secret.as_bytes(), body)
}

pub fn verify_webhook_signature(webhook_secret: &str, body: &[u8], signature_hex: &str) -> bool {
    if webhook_secret.is_empty() {
        return false;
    }
    verify(webhook_secret.as_bytes(), body, signature_hex)
}
