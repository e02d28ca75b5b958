//! Shared harness for the in-process router scenarios: a `MemStore`, a fake
//! gateway that signs like the real one, and request helpers.
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use anyhow::{anyhow, Result};
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use plt_api::{
    routes,
    state::{AppState, Settings},
};
use plt_auth::TokenIssuer;
use plt_db::{MemStore, Store};
use plt_payments::{GatewayOrder, GatewayOrderRequest, PaymentGateway};
use plt_schemas::{NewFood, NewUser, Role};
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot
use uuid::Uuid;

pub const KEY_SECRET: &str = "fake_key_secret";
pub const WEBHOOK_SECRET: &str = "fake_webhook_secret";
pub const DELIVERY_FEE: i64 = 3_000;
pub const MAX_QTY: i32 = 10;

/// Gateway double. Orders get sequential ids; signatures use the real HMAC
/// scheme so the handlers exercise the same verification path.
#[derive(Default)]
pub struct FakeGateway {
    pub fail_create: AtomicBool,
    seq: AtomicU64,
}

#[async_trait::async_trait]
impl PaymentGateway for FakeGateway {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn key_id(&self) -> &str {
        "rzp_fake_key"
    }

    async fn create_order(&self, req: GatewayOrderRequest) -> Result<GatewayOrder> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("gateway unavailable"));
        }
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            gateway_order_id: format!("order_fake{n}"),
            amount_minor: req.amount_minor,
            currency: req.currency,
        })
    }

    fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        plt_payments::verify_payment_signature(KEY_SECRET, order_id, payment_id, signature)
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        plt_payments::verify_webhook_signature(WEBHOOK_SECRET, body, signature)
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub gateway: Arc<FakeGateway>,
}

impl Harness {
    pub fn new() -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let state = AppState::new(
            Arc::new(MemStore::new()),
            gateway.clone(),
            TokenIssuer::new(b"scenario-secret", 3600),
            Settings {
                currency: "INR".to_string(),
                delivery_fee_minor: DELIVERY_FEE,
                max_item_quantity: MAX_QTY,
                min_password_len: 8,
            },
        );
        Self {
            state: Arc::new(state),
            gateway,
        }
    }

    pub fn with_state(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
            gateway: Arc::new(FakeGateway::default()),
        }
    }

    pub fn router(&self) -> axum::Router {
        routes::build_router(Arc::clone(&self.state))
    }

    /// Drive the router with one request; returns (status, json body or Null).
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(v) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(axum::body::Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn send(&self, req: Request<axum::body::Body>) -> (StatusCode, Value) {
        let resp = self.router().oneshot(req).await.expect("oneshot failed");
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .expect("body collect failed")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body is not valid JSON")
        };
        (status, json)
    }

    /// Register a customer through the API; returns (token, user_id).
    pub async fn customer(&self, email: &str) -> (String, Uuid) {
        let (status, body) = self
            .call(
                "POST",
                "/v1/auth/register",
                None,
                Some(json!({"name": "Customer", "email": email, "password": "correct horse"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        let token = body["token"].as_str().unwrap().to_string();
        let user_id = body["user"]["user_id"].as_str().unwrap().parse().unwrap();
        (token, user_id)
    }

    /// Admins are created out of band (CLI), never through the API.
    pub async fn admin(&self) -> String {
        let user = self
            .state
            .store
            .create_user(NewUser {
                name: "Admin".to_string(),
                email: format!("admin-{}@example.com", Uuid::new_v4()),
                password_hash: plt_auth::hash_password("admin password").unwrap(),
                role: Role::Admin,
            })
            .await
            .unwrap();
        self.state.tokens.issue(&user).unwrap()
    }

    pub async fn food(&self, name: &str, price_minor: i64) -> Uuid {
        self.state
            .store
            .create_food(NewFood {
                name: name.to_string(),
                description: format!("{name}, freshly made"),
                price_minor,
                category: "Mains".to_string(),
                image_url: None,
                available: true,
            })
            .await
            .unwrap()
            .food_id
    }

    pub async fn add_to_cart(&self, token: &str, food_id: Uuid, quantity: i32) -> Value {
        let (status, body) = self
            .call(
                "POST",
                "/v1/cart/items",
                Some(token),
                Some(json!({"food_id": food_id, "quantity": quantity})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "add to cart failed: {body}");
        body
    }

    pub async fn checkout(&self, token: &str, method: &str) -> (StatusCode, Value) {
        self.call(
            "POST",
            "/v1/orders/checkout",
            Some(token),
            Some(json!({"address": address(), "payment_method": method})),
        )
        .await
    }
}

pub fn address() -> Value {
    json!({
        "full_name": "Asha Rao",
        "phone": "+91 98450 00000",
        "line1": "12 MG Road",
        "city": "Bengaluru",
        "postal_code": "560001"
    })
}

/// Sum of line totals in a cart JSON body.
pub fn sum_lines(cart: &Value) -> i64 {
    cart["lines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["line_total_minor"].as_i64().unwrap())
        .sum()
}
