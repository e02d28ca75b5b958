//! Shared runtime state for plt-api.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The broadcast bus feeds
//! the admin SSE stream; background tasks here keep it warm.

use std::sync::Arc;
use std::time::Duration;

use plt_auth::TokenIssuer;
use plt_config::AppConfig;
use plt_db::Store;
use plt_payments::PaymentGateway;
use plt_schemas::{DashboardMetrics, Order, OrderStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Metrics(DashboardMetrics),
    Order(OrderEvent),
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Metrics(_) => "metrics",
            BusMsg::Order(_) => "order",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Placed,
    StatusChanged,
    PaymentUpdated,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub amount_minor: i64,
    pub kind: OrderEventKind,
}

impl OrderEvent {
    pub fn from_order(order: &Order, kind: OrderEventKind) -> Self {
        Self {
            order_id: order.order_id,
            user_id: order.user_id,
            status: order.status,
            payment_status: order.payment_status,
            amount_minor: order.amount_minor,
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo / Settings
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// The slice of `AppConfig` handlers consult per request.
#[derive(Clone, Debug)]
pub struct Settings {
    pub currency: String,
    pub delivery_fee_minor: i64,
    pub max_item_quantity: i32,
    pub min_password_len: usize,
}

impl Settings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            currency: cfg.payments.currency.trim().to_string(),
            delivery_fee_minor: cfg.orders.delivery_fee_minor,
            max_item_quantity: cfg.orders.max_item_quantity,
            min_password_len: cfg.auth.min_password_len,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub tokens: TokenIssuer,
    pub settings: Settings,
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        tokens: TokenIssuer,
        settings: Settings,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            store,
            gateway,
            tokens,
            settings,
            bus,
            build: BuildInfo {
                service: "plt-api",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }

    /// Publish an order event. No subscribers is not an error.
    pub fn publish_order(&self, order: &Order, kind: OrderEventKind) {
        let _ = self
            .bus
            .send(BusMsg::Order(OrderEvent::from_order(order, kind)));
    }
}

/// Recompute dashboard metrics and broadcast them.
pub async fn publish_metrics(state: &AppState) -> anyhow::Result<DashboardMetrics> {
    let metrics = state.store.dashboard_metrics().await?;
    let _ = state.bus.send(BusMsg::Metrics(metrics.clone()));
    Ok(metrics)
}

/// Recompute and broadcast metrics on a background task so the caller's
/// response is not held up by the aggregate queries.
pub fn schedule_metrics_refresh(state: &Arc<AppState>) {
    if state.bus.receiver_count() == 0 {
        return;
    }
    let state = Arc::clone(state);
    tokio::spawn(async move {
        if let Err(e) = publish_metrics(&state).await {
            warn!(error = %e, "metrics refresh failed");
        }
    });
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn a background task that re-broadcasts metrics every `interval`,
/// catching changes made outside this process (CLI imports, other replicas).
pub fn spawn_metrics_refresh(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if state.bus.receiver_count() == 0 {
                continue;
            }
            match publish_metrics(&state).await {
                Ok(m) => debug!(total_orders = m.total_orders, "metrics refreshed"),
                Err(e) => warn!(error = %e, "periodic metrics refresh failed"),
            }
        }
    });
}
