//! Axum router and all HTTP handlers for plt-api.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers, so tests can drive the bare router.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, patch, post, put},
    Json, Router,
};
use futures_util::{stream, Stream, StreamExt};
use plt_db::OrderDraft;
use plt_payments::{GatewayOrderRequest, WebhookEvent};
use plt_schemas::{
    FoodFilter, FoodPatch, NewFood, NewUser, Order, OrderStatus, PaymentMethod, PaymentOutcome,
    Role,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api_types::{
        AddCartItemRequest, AdminOrdersQuery, AuthResponse, CheckoutRequest, CheckoutResponse,
        HealthResponse, LoginRequest, PaymentInstructions, RegisterRequest, SetCartItemRequest,
        StreamQuery, UpdateOrderStatusRequest, VerifyPaymentRequest, WebhookAck,
    },
    error::ApiError,
    extract::{
        bearer_token, require_admin, verify_token, AdminUser, ApiJson, ApiPath, ApiQuery,
        AuthUser,
    },
    state::{schedule_metrics_refresh, AppState, BusMsg, OrderEventKind},
};

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-razorpay-signature";

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        // auth
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/me", get(me))
        // catalog
        .route("/v1/foods", get(list_foods))
        .route("/v1/foods/:id", get(get_food))
        .route("/v1/categories", get(categories))
        // cart
        .route("/v1/cart", get(get_cart).delete(clear_cart))
        .route("/v1/cart/items", post(add_cart_item))
        .route(
            "/v1/cart/items/:food_id",
            put(set_cart_item).delete(remove_cart_item),
        )
        // orders
        .route("/v1/orders", get(list_my_orders))
        .route("/v1/orders/checkout", post(checkout))
        .route("/v1/orders/:id", get(get_order))
        .route("/v1/orders/:id/verify-payment", post(verify_payment))
        .route("/v1/orders/:id/cancel", post(cancel_order))
        .route("/v1/payments/webhook", post(payment_webhook))
        // admin
        .route(
            "/v1/admin/foods",
            get(admin_list_foods).post(admin_create_food),
        )
        .route(
            "/v1/admin/foods/:id",
            patch(admin_update_food).delete(admin_delete_food),
        )
        .route("/v1/admin/orders", get(admin_list_orders))
        .route("/v1/admin/orders/:id/status", patch(admin_update_status))
        .route("/v1/admin/dashboard", get(admin_dashboard))
        .route("/v1/admin/stream", get(admin_stream))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            storage: st.store.backend_name().to_string(),
            payments: st.gateway.name().to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// /v1/auth
// ---------------------------------------------------------------------------

const BAD_CREDENTIALS: &str = "invalid email or password";

pub(crate) async fn register(
    State(st): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<Response> {
    let reg = plt_auth::validate_registration(
        &req.name,
        &req.email,
        &req.password,
        st.settings.min_password_len,
    )
    .map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;

    let password = reg.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || plt_auth::hash_password(&password))
        .await
        .map_err(anyhow::Error::new)??;

    let user = st
        .store
        .create_user(NewUser {
            name: reg.name,
            email: reg.email,
            password_hash,
            role: Role::Customer,
        })
        .await?;
    let token = st.tokens.issue(&user)?;

    info!(user_id = %user.user_id, "user registered");
    schedule_metrics_refresh(&st);
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })).into_response())
}

pub(crate) async fn login(
    State(st): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let unauthorized = || ApiError::Unauthorized(BAD_CREDENTIALS.to_string());

    let email = plt_auth::normalize_email(&req.email).map_err(|_| unauthorized())?;
    let Some((user, password_hash)) = st.store.find_credentials(&email).await? else {
        return Err(unauthorized());
    };

    let password = req.password;
    let ok = tokio::task::spawn_blocking(move || {
        plt_auth::verify_password(&password, &password_hash)
    })
    .await
    .map_err(anyhow::Error::new)??;
    if !ok {
        warn!(user_id = %user.user_id, "login rejected");
        return Err(unauthorized());
    }

    let token = st.tokens.issue(&user)?;
    Ok(Json(AuthResponse { token, user }))
}

pub(crate) async fn me(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> ApiResult<Json<plt_schemas::User>> {
    st.store
        .get_user(claims.sub)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::Unauthorized("account no longer exists".to_string()))
}

// ---------------------------------------------------------------------------
// /v1/foods, /v1/categories
// ---------------------------------------------------------------------------

pub(crate) async fn list_foods(
    State(st): State<Arc<AppState>>,
    ApiQuery(mut filter): ApiQuery<FoodFilter>,
) -> ApiResult<Json<Vec<plt_schemas::FoodItem>>> {
    filter.include_unavailable = false;
    Ok(Json(st.store.list_foods(&filter).await?))
}

pub(crate) async fn get_food(
    State(st): State<Arc<AppState>>,
    ApiPath(food_id): ApiPath<Uuid>,
) -> ApiResult<Json<plt_schemas::FoodItem>> {
    st.store
        .get_food(food_id)
        .await?
        .filter(|f| f.available)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("food"))
}

pub(crate) async fn categories(
    State(st): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<plt_schemas::CategorySummary>>> {
    Ok(Json(st.store.categories().await?))
}

// ---------------------------------------------------------------------------
// /v1/cart
// ---------------------------------------------------------------------------

pub(crate) async fn get_cart(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> ApiResult<Json<plt_schemas::Cart>> {
    Ok(Json(st.store.get_cart(claims.sub).await?))
}

pub(crate) async fn add_cart_item(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ApiJson(req): ApiJson<AddCartItemRequest>,
) -> ApiResult<Json<plt_schemas::Cart>> {
    let cart = st
        .store
        .add_cart_item(
            claims.sub,
            req.food_id,
            req.quantity,
            st.settings.max_item_quantity,
        )
        .await?;
    Ok(Json(cart))
}

pub(crate) async fn set_cart_item(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ApiPath(food_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SetCartItemRequest>,
) -> ApiResult<Json<plt_schemas::Cart>> {
    if req.quantity < 0 {
        return Err(ApiError::BadRequest("quantity must be >= 0".to_string()));
    }
    let cart = st
        .store
        .set_cart_item(
            claims.sub,
            food_id,
            req.quantity,
            st.settings.max_item_quantity,
        )
        .await?;
    Ok(Json(cart))
}

pub(crate) async fn remove_cart_item(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ApiPath(food_id): ApiPath<Uuid>,
) -> ApiResult<Json<plt_schemas::Cart>> {
    Ok(Json(st.store.remove_cart_item(claims.sub, food_id).await?))
}

pub(crate) async fn clear_cart(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> ApiResult<StatusCode> {
    st.store.clear_cart(claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// /v1/orders
// ---------------------------------------------------------------------------

/// Place an order from the caller's cart.
///
/// Online orders get a gateway order attached before the response goes out.
/// If the gateway refuses, the order is cancelled with a failed payment and
/// the cart is put back, so the customer can retry or switch to cash.
pub(crate) async fn checkout(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ApiJson(req): ApiJson<CheckoutRequest>,
) -> ApiResult<Response> {
    req.address.validate().map_err(ApiError::BadRequest)?;
    if req.payment_method == PaymentMethod::Online && !st.gateway.enabled() {
        return Err(ApiError::PaymentsDisabled);
    }

    let draft = OrderDraft {
        order_id: Uuid::new_v4(),
        address: req.address,
        payment_method: req.payment_method,
        delivery_fee_minor: st.settings.delivery_fee_minor,
        currency: st.settings.currency.clone(),
    };
    let order = st.store.place_order(claims.sub, draft).await?;
    info!(
        order_id = %order.order_id,
        user_id = %order.user_id,
        amount_minor = order.amount_minor,
        method = order.payment_method.as_str(),
        "order placed"
    );
    st.publish_order(&order, OrderEventKind::Placed);
    schedule_metrics_refresh(&st);

    if order.payment_method != PaymentMethod::Online {
        let body = CheckoutResponse {
            order,
            payment: None,
        };
        return Ok((StatusCode::CREATED, Json(body)).into_response());
    }

    let gw_req = GatewayOrderRequest {
        amount_minor: order.amount_minor,
        currency: order.currency.clone(),
        receipt: order.order_id.to_string(),
    };
    let gw_order = match st.gateway.create_order(gw_req).await {
        Ok(g) => g,
        Err(e) => {
            warn!(order_id = %order.order_id, error = %e, "gateway order creation failed");
            if let Err(cleanup) = abandon_online_order(&st, &order, &format!("{e:#}")).await {
                tracing::error!(
                    order_id = %order.order_id,
                    error = %cleanup,
                    "failed to roll back order after gateway failure"
                );
            }
            return Err(ApiError::Gateway(
                "could not start online payment; your cart has been restored".to_string(),
            ));
        }
    };

    let order = st
        .store
        .attach_gateway_order(order.order_id, &gw_order.gateway_order_id)
        .await?;
    let payment = PaymentInstructions {
        gateway: st.gateway.name().to_string(),
        key_id: st.gateway.key_id().to_string(),
        gateway_order_id: gw_order.gateway_order_id,
        amount_minor: gw_order.amount_minor,
        currency: gw_order.currency,
    };
    let body = CheckoutResponse {
        order,
        payment: Some(payment),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn abandon_online_order(st: &Arc<AppState>, order: &Order, reason: &str) -> ApiResult<()> {
    st.store
        .record_payment(
            order.order_id,
            PaymentOutcome::Failed {
                reason: reason.to_string(),
            },
        )
        .await?;
    let cancelled = st
        .store
        .update_order_status(order.order_id, OrderStatus::Cancelled, Some(OrderStatus::Placed))
        .await?;
    st.store.restore_cart(order.user_id, order).await?;
    st.publish_order(&cancelled, OrderEventKind::Cancelled);
    schedule_metrics_refresh(st);
    Ok(())
}

/// The caller's own order; anything else is indistinguishable from missing.
async fn load_owned_order(st: &AppState, order_id: Uuid, user_id: Uuid) -> ApiResult<Order> {
    match st.store.get_order(order_id).await? {
        Some(o) if o.user_id == user_id => Ok(o),
        _ => Err(ApiError::not_found("order")),
    }
}

pub(crate) async fn verify_payment(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ApiPath(order_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<VerifyPaymentRequest>,
) -> ApiResult<Json<Order>> {
    let order = load_owned_order(&st, order_id, claims.sub).await?;
    if order.payment_method != PaymentMethod::Online {
        return Err(ApiError::BadRequest(
            "order is not paid online".to_string(),
        ));
    }
    if order.gateway_order_id.as_deref() != Some(req.gateway_order_id.as_str()) {
        return Err(ApiError::BadRequest(
            "gateway order id does not belong to this order".to_string(),
        ));
    }

    let valid = st.gateway.verify_payment(
        &req.gateway_order_id,
        &req.gateway_payment_id,
        &req.signature,
    );
    if !valid {
        warn!(%order_id, "payment signature rejected");
        let failed = st
            .store
            .record_payment(
                order_id,
                PaymentOutcome::Failed {
                    reason: "signature mismatch".to_string(),
                },
            )
            .await?;
        st.publish_order(&failed, OrderEventKind::PaymentUpdated);
        schedule_metrics_refresh(&st);
        return Err(ApiError::PaymentSignatureInvalid);
    }

    let paid = st
        .store
        .record_payment(
            order_id,
            PaymentOutcome::Captured {
                payment_id: req.gateway_payment_id,
            },
        )
        .await?;
    info!(%order_id, payment_status = paid.payment_status.as_str(), "payment verified");
    st.publish_order(&paid, OrderEventKind::PaymentUpdated);
    schedule_metrics_refresh(&st);
    Ok(Json(paid))
}

pub(crate) async fn list_my_orders(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(st.store.list_orders_for_user(claims.sub).await?))
}

pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ApiPath(order_id): ApiPath<Uuid>,
) -> ApiResult<Json<Order>> {
    match st.store.get_order(order_id).await? {
        Some(o) if o.user_id == claims.sub || claims.is_admin() => Ok(Json(o)),
        _ => Err(ApiError::not_found("order")),
    }
}

pub(crate) async fn cancel_order(
    State(st): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ApiPath(order_id): ApiPath<Uuid>,
) -> ApiResult<Json<Order>> {
    let order = load_owned_order(&st, order_id, claims.sub).await?;
    if order.status != OrderStatus::Placed {
        return Err(ApiError::InvalidTransition(format!(
            "order is {} and can no longer be cancelled",
            order.status.as_str()
        )));
    }
    let cancelled = st
        .store
        .update_order_status(order_id, OrderStatus::Cancelled, Some(OrderStatus::Placed))
        .await?;
    info!(%order_id, user_id = %claims.sub, "order cancelled by customer");
    st.publish_order(&cancelled, OrderEventKind::Cancelled);
    schedule_metrics_refresh(&st);
    Ok(Json(cancelled))
}

// ---------------------------------------------------------------------------
// POST /v1/payments/webhook
// ---------------------------------------------------------------------------

/// Gateway callback. Authenticated by the HMAC over the raw body; answers
/// 200 for anything it understood or chose to ignore so the gateway stops
/// retrying.
pub(crate) async fn payment_webhook(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing webhook signature".to_string()))?;
    if !st.gateway.verify_webhook(&body, signature) {
        warn!("webhook signature rejected");
        return Err(ApiError::Unauthorized(
            "invalid webhook signature".to_string(),
        ));
    }

    let event = WebhookEvent::parse(&body).map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    let (gateway_order_id, outcome) = match event {
        WebhookEvent::PaymentCaptured {
            gateway_order_id,
            gateway_payment_id,
        } => (
            gateway_order_id,
            PaymentOutcome::Captured {
                payment_id: gateway_payment_id,
            },
        ),
        WebhookEvent::PaymentFailed {
            gateway_order_id,
            reason,
            ..
        } => (gateway_order_id, PaymentOutcome::Failed { reason }),
        WebhookEvent::Ignored(name) => {
            info!(event = %name, "webhook event ignored");
            return Ok(Json(WebhookAck {
                received: true,
                applied: false,
            }));
        }
    };

    let Some(order) = st
        .store
        .find_order_by_gateway_order(&gateway_order_id)
        .await?
    else {
        warn!(%gateway_order_id, "webhook for unknown gateway order");
        return Ok(Json(WebhookAck {
            received: true,
            applied: false,
        }));
    };

    let updated = match st.store.record_payment(order.order_id, outcome).await {
        Ok(o) => o,
        Err(plt_db::StoreError::Conflict(msg)) => {
            warn!(order_id = %order.order_id, %msg, "webhook payment conflicts with recorded payment");
            return Ok(Json(WebhookAck {
                received: true,
                applied: false,
            }));
        }
        Err(e) => return Err(e.into()),
    };

    let applied = updated != order;
    if applied {
        info!(
            order_id = %updated.order_id,
            payment_status = updated.payment_status.as_str(),
            "webhook payment applied"
        );
        st.publish_order(&updated, OrderEventKind::PaymentUpdated);
        schedule_metrics_refresh(&st);
    }
    Ok(Json(WebhookAck {
        received: true,
        applied,
    }))
}

// ---------------------------------------------------------------------------
// /v1/admin/foods
// ---------------------------------------------------------------------------

pub(crate) async fn admin_list_foods(
    State(st): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(mut filter): ApiQuery<FoodFilter>,
) -> ApiResult<Json<Vec<plt_schemas::FoodItem>>> {
    filter.include_unavailable = true;
    Ok(Json(st.store.list_foods(&filter).await?))
}

pub(crate) async fn admin_create_food(
    State(st): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiJson(new): ApiJson<NewFood>,
) -> ApiResult<Response> {
    let item = st.store.create_food(new).await?;
    info!(food_id = %item.food_id, admin_id = %admin.sub, "food created");
    schedule_metrics_refresh(&st);
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

pub(crate) async fn admin_update_food(
    State(st): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(food_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<FoodPatch>,
) -> ApiResult<Json<plt_schemas::FoodItem>> {
    let item = st
        .store
        .update_food(food_id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("food"))?;
    info!(%food_id, admin_id = %admin.sub, available = item.available, "food updated");
    schedule_metrics_refresh(&st);
    Ok(Json(item))
}

pub(crate) async fn admin_delete_food(
    State(st): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(food_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    if !st.store.delete_food(food_id).await? {
        return Err(ApiError::not_found("food"));
    }
    info!(%food_id, admin_id = %admin.sub, "food deleted");
    schedule_metrics_refresh(&st);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// /v1/admin/orders, /v1/admin/dashboard
// ---------------------------------------------------------------------------

pub(crate) async fn admin_list_orders(
    State(st): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(q): ApiQuery<AdminOrdersQuery>,
) -> ApiResult<Json<Vec<Order>>> {
    let status = q
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(OrderStatus::parse)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(st.store.list_orders(status).await?))
}

pub(crate) async fn admin_update_status(
    State(st): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(order_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateOrderStatusRequest>,
) -> ApiResult<Json<Order>> {
    let order = st
        .store
        .update_order_status(order_id, req.status, None)
        .await?;
    info!(
        %order_id,
        admin_id = %admin.sub,
        status = order.status.as_str(),
        "order status changed"
    );
    let kind = if order.status == OrderStatus::Cancelled {
        OrderEventKind::Cancelled
    } else {
        OrderEventKind::StatusChanged
    };
    st.publish_order(&order, kind);
    schedule_metrics_refresh(&st);
    Ok(Json(order))
}

pub(crate) async fn admin_dashboard(
    State(st): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<plt_schemas::DashboardMetrics>> {
    Ok(Json(st.store.dashboard_metrics().await?))
}

// ---------------------------------------------------------------------------
// GET /v1/admin/stream  (SSE)
// ---------------------------------------------------------------------------

/// Live dashboard feed. Accepts the token from `?token=` as well as the
/// Authorization header since EventSource cannot set headers.
pub(crate) async fn admin_stream(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiQuery(q): ApiQuery<StreamQuery>,
) -> ApiResult<Response> {
    let token = bearer_token(&headers).or(q.token.as_deref());
    require_admin(verify_token(&st, token)?)?;

    // Subscribe before the snapshot so nothing published in between is lost.
    let rx = st.bus.subscribe();
    let snapshot = st.store.dashboard_metrics().await?;
    let first = sse_event(&BusMsg::Metrics(snapshot));

    let mut resp_headers = HeaderMap::new();
    resp_headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    resp_headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let events = stream::iter(first.map(Ok)).chain(broadcast_to_sse(rx));
    Ok((resp_headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response())
}

fn sse_event(msg: &BusMsg) -> Option<Event> {
    let data = serde_json::to_string(msg).ok()?;
    Some(Event::default().event(msg.event_name()).data(data))
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => sse_event(&m).map(Ok),
            Err(_) => None, // lagged / closed
        }
    })
}
