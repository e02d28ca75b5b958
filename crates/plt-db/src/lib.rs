//! Persistence for the Platter API.
//!
//! [`Store`] is the single seam the HTTP layer talks to. [`PgStore`] backs
//! production with Postgres; [`MemStore`] keeps everything in process for
//! tests and local development. Both maintain the cart invariant: the stored
//! total equals the sum of the line totals after every mutation.

use anyhow::{Context, Result};
use plt_schemas::{
    Cart, CategorySummary, DashboardMetrics, DeliveryAddress, FoodFilter, FoodItem, FoodPatch,
    NewFood, NewUser, Order, OrderStatus, PaymentMethod, PaymentOutcome, User,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

mod mem;
mod pg;

pub use mem::MemStore;
pub use pg::PgStore;

pub const ENV_DB_URL: &str = "PLT_DATABASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("illegal order transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub(crate) fn transition(from: OrderStatus, to: OrderStatus) -> Self {
        StoreError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(anyhow::Error::new(e))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Everything `place_order` needs besides the cart itself.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    /// Pre-generated so it can double as the gateway receipt.
    pub order_id: Uuid,
    pub address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    pub delivery_fee_minor: i64,
    pub currency: String,
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    fn backend_name(&self) -> &'static str;

    // --- users ---
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;
    /// User plus stored password hash, looked up by normalized email.
    async fn find_credentials(&self, email: &str) -> StoreResult<Option<(User, String)>>;
    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    // --- catalog ---
    async fn list_foods(&self, filter: &FoodFilter) -> StoreResult<Vec<FoodItem>>;
    async fn get_food(&self, food_id: Uuid) -> StoreResult<Option<FoodItem>>;
    async fn create_food(&self, new: NewFood) -> StoreResult<FoodItem>;
    async fn update_food(&self, food_id: Uuid, patch: FoodPatch) -> StoreResult<Option<FoodItem>>;
    /// Also drops the food from every cart and recomputes those totals.
    async fn delete_food(&self, food_id: Uuid) -> StoreResult<bool>;
    async fn categories(&self) -> StoreResult<Vec<CategorySummary>>;

    // --- cart ---
    async fn get_cart(&self, user_id: Uuid) -> StoreResult<Cart>;
    async fn add_cart_item(
        &self,
        user_id: Uuid,
        food_id: Uuid,
        quantity: i32,
        max_quantity: i32,
    ) -> StoreResult<Cart>;
    /// `quantity == 0` removes the line.
    async fn set_cart_item(
        &self,
        user_id: Uuid,
        food_id: Uuid,
        quantity: i32,
        max_quantity: i32,
    ) -> StoreResult<Cart>;
    async fn remove_cart_item(&self, user_id: Uuid, food_id: Uuid) -> StoreResult<Cart>;
    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()>;

    // --- orders ---
    /// Converts the cart into an order and deletes the cart, atomically.
    async fn place_order(&self, user_id: Uuid, draft: OrderDraft) -> StoreResult<Order>;
    /// Puts an order's lines back into the user's cart (still-available foods only).
    async fn restore_cart(&self, user_id: Uuid, order: &Order) -> StoreResult<Cart>;
    async fn attach_gateway_order(&self, order_id: Uuid, gateway_order_id: &str) -> StoreResult<Order>;
    async fn get_order(&self, order_id: Uuid) -> StoreResult<Option<Order>>;
    async fn find_order_by_gateway_order(&self, gateway_order_id: &str) -> StoreResult<Option<Order>>;
    async fn list_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
    async fn list_orders(&self, status: Option<OrderStatus>) -> StoreResult<Vec<Order>>;
    /// Moves an order to `next`. With `expected_from`, the order must still be
    /// in that status when the write happens.
    async fn update_order_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        expected_from: Option<OrderStatus>,
    ) -> StoreResult<Order>;
    async fn record_payment(&self, order_id: Uuid, outcome: PaymentOutcome) -> StoreResult<Order>;

    // --- dashboard ---
    async fn dashboard_metrics(&self) -> StoreResult<DashboardMetrics>;
}

pub(crate) fn validate_quantity(quantity: i32, max_quantity: i32) -> StoreResult<()> {
    if quantity < 1 {
        return Err(StoreError::Validation("quantity must be >= 1".to_string()));
    }
    if quantity > max_quantity {
        return Err(StoreError::Validation(format!(
            "quantity {quantity} exceeds the per-item limit of {max_quantity}"
        )));
    }
    Ok(())
}

/// Connect to Postgres.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Connect to Postgres using PLT_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_orders_table: exists,
    })
}
