//! Postgres store. Cart and order mutations run in one transaction with the
//! cart (or order) row locked `FOR UPDATE`.

use anyhow::Context;
use plt_schemas::{
    Cart, CartLine, CategorySummary, DashboardMetrics, DeliveryAddress, FoodFilter, FoodItem,
    FoodPatch, NewFood, NewUser, Order, OrderLine, OrderStatus, PaymentMethod, PaymentOutcome,
    PaymentStatus, Role, User,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::mem::order_amounts;
use crate::{validate_quantity, OrderDraft, Store, StoreError, StoreResult};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Detect a Postgres unique constraint violation by name.
fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

const USER_COLUMNS: &str = "user_id, name, email, role, created_at_utc";

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: Role::parse(&row.try_get::<String, _>("role")?)?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

const FOOD_COLUMNS: &str = "food_id, name, description, price_minor, category, image_url, \
                            available, created_at_utc, updated_at_utc";

fn food_from_row(row: &PgRow) -> StoreResult<FoodItem> {
    Ok(FoodItem {
        food_id: row.try_get("food_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price_minor: row.try_get("price_minor")?,
        category: row.try_get("category")?,
        image_url: row.try_get("image_url")?,
        available: row.try_get("available")?,
        created_at_utc: row.try_get("created_at_utc")?,
        updated_at_utc: row.try_get("updated_at_utc")?,
    })
}

const ORDER_COLUMNS: &str = "order_id, user_id, subtotal_minor, delivery_fee_minor, amount_minor, \
                             currency, address, payment_method, payment_status, status, \
                             gateway_order_id, gateway_payment_id, created_at_utc, updated_at_utc";

/// Order header without lines; callers attach lines afterwards.
fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let Json(address): Json<DeliveryAddress> = row.try_get("address")?;
    Ok(Order {
        order_id: row.try_get("order_id")?,
        user_id: row.try_get("user_id")?,
        lines: Vec::new(),
        subtotal_minor: row.try_get("subtotal_minor")?,
        delivery_fee_minor: row.try_get("delivery_fee_minor")?,
        amount_minor: row.try_get("amount_minor")?,
        currency: row.try_get("currency")?,
        address,
        payment_method: PaymentMethod::parse(&row.try_get::<String, _>("payment_method")?)?,
        payment_status: PaymentStatus::parse(&row.try_get::<String, _>("payment_status")?)?,
        status: OrderStatus::parse(&row.try_get::<String, _>("status")?)?,
        gateway_order_id: row.try_get("gateway_order_id")?,
        gateway_payment_id: row.try_get("gateway_payment_id")?,
        created_at_utc: row.try_get("created_at_utc")?,
        updated_at_utc: row.try_get("updated_at_utc")?,
    })
}

async fn attach_lines(conn: &mut PgConnection, orders: &mut [Order]) -> StoreResult<()> {
    if orders.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = orders.iter().map(|o| o.order_id).collect();
    let rows = sqlx::query(
        r#"
        select order_id, food_id, name, unit_price_minor, quantity, line_total_minor
        from order_items
        where order_id = any($1)
        order by order_id, line_no
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    for row in rows {
        let order_id: Uuid = row.try_get("order_id")?;
        let line = OrderLine {
            food_id: row.try_get("food_id")?,
            name: row.try_get("name")?,
            unit_price_minor: row.try_get("unit_price_minor")?,
            quantity: row.try_get("quantity")?,
            line_total_minor: row.try_get("line_total_minor")?,
        };
        if let Some(o) = orders.iter_mut().find(|o| o.order_id == order_id) {
            o.lines.push(line);
        }
    }
    Ok(())
}

async fn fetch_order(conn: &mut PgConnection, order_id: Uuid, lock: bool) -> StoreResult<Option<Order>> {
    let sql = format!(
        "select {ORDER_COLUMNS} from orders where order_id = $1{}",
        if lock { " for update" } else { "" }
    );
    let Some(row) = sqlx::query(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let mut orders = vec![order_from_row(&row)?];
    attach_lines(conn, &mut orders).await?;
    Ok(orders.pop())
}

async fn orders_with_lines(conn: &mut PgConnection, rows: &[PgRow]) -> StoreResult<Vec<Order>> {
    let mut orders = rows.iter().map(order_from_row).collect::<StoreResult<Vec<_>>>()?;
    attach_lines(conn, &mut orders).await?;
    Ok(orders)
}

/// Find-or-create the cart row and lock it for the rest of the transaction.
async fn lock_cart(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<()> {
    sqlx::query("insert into carts (user_id) values ($1) on conflict (user_id) do nothing")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("select user_id from carts where user_id = $1 for update")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(())
}

/// Recompute the denormalized cart total from its lines. Drops the cart row
/// once it has no lines.
async fn recompute_cart_total(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<()> {
    sqlx::query(
        r#"
        update carts
        set total_minor = coalesce(
                (select sum(unit_price_minor * quantity) from cart_items where user_id = $1),
                0
            )::bigint,
            updated_at_utc = now()
        where user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        delete from carts c
        where c.user_id = $1
          and not exists (select 1 from cart_items i where i.user_id = c.user_id)
        "#,
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn load_cart(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<Cart> {
    let header = sqlx::query("select total_minor, updated_at_utc from carts where user_id = $1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(header) = header else {
        return Ok(Cart::empty(user_id));
    };

    let rows = sqlx::query(
        r#"
        select i.food_id, f.name, i.unit_price_minor, i.quantity
        from cart_items i
        join foods f on f.food_id = i.food_id
        where i.user_id = $1
        order by i.added_at_utc, i.food_id
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        let unit_price_minor: i64 = row.try_get("unit_price_minor")?;
        let quantity: i32 = row.try_get("quantity")?;
        lines.push(CartLine {
            food_id: row.try_get("food_id")?,
            name: row.try_get("name")?,
            unit_price_minor,
            quantity,
            line_total_minor: plt_schemas::line_total(unit_price_minor, quantity)?,
        });
    }

    Ok(Cart {
        user_id,
        lines,
        total_minor: header.try_get("total_minor")?,
        updated_at_utc: header.try_get("updated_at_utc")?,
    })
}

/// Current catalog price of an available food.
async fn available_price(conn: &mut PgConnection, food_id: Uuid) -> StoreResult<i64> {
    let row = sqlx::query("select price_minor, available from foods where food_id = $1")
        .bind(food_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::NotFound("food"))?;
    if !row.try_get::<bool, _>("available")? {
        return Err(StoreError::Validation(format!(
            "food {food_id} is not available"
        )));
    }
    Ok(row.try_get("price_minor")?)
}

#[async_trait::async_trait]
impl Store for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let sql = format!(
            "insert into users (user_id, name, email, password_hash, role) \
             values ($1, $2, $3, $4, $5) returning {USER_COLUMNS}"
        );
        let res = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .fetch_one(&self.pool)
            .await;
        match res {
            Ok(row) => user_from_row(&row),
            Err(e) if is_unique_constraint_violation(&e, "uq_users_email") => {
                Err(StoreError::Conflict("email already registered".to_string()))
            }
            Err(e) => Err(anyhow::Error::new(e).context("create_user failed").into()),
        }
    }

    async fn find_credentials(&self, email: &str) -> StoreResult<Option<(User, String)>> {
        let sql = format!("select {USER_COLUMNS}, password_hash from users where email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some((user_from_row(&r)?, r.try_get("password_hash")?))),
            None => Ok(None),
        }
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("select {USER_COLUMNS} from users where user_id = $1");
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_foods(&self, filter: &FoodFilter) -> StoreResult<Vec<FoodItem>> {
        let query = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));
        let sql = format!(
            r#"
            select {FOOD_COLUMNS}
            from foods
            where ($1 or available)
              and ($2::text is null or category = $2)
              and ($3::text is null or name ilike $3 escape '\' or description ilike $3 escape '\')
            order by category, name, food_id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.include_unavailable)
            .bind(filter.category.as_deref())
            .bind(query)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(food_from_row).collect()
    }

    async fn get_food(&self, food_id: Uuid) -> StoreResult<Option<FoodItem>> {
        let sql = format!("select {FOOD_COLUMNS} from foods where food_id = $1");
        let row = sqlx::query(&sql)
            .bind(food_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(food_from_row).transpose()
    }

    async fn create_food(&self, new: NewFood) -> StoreResult<FoodItem> {
        new.validate().map_err(StoreError::Validation)?;
        let sql = format!(
            "insert into foods (food_id, name, description, price_minor, category, image_url, available) \
             values ($1, $2, $3, $4, $5, $6, $7) returning {FOOD_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(new.name.trim())
            .bind(&new.description)
            .bind(new.price_minor)
            .bind(new.category.trim())
            .bind(&new.image_url)
            .bind(new.available)
            .fetch_one(&self.pool)
            .await
            .context("create_food failed")?;
        food_from_row(&row)
    }

    async fn update_food(&self, food_id: Uuid, patch: FoodPatch) -> StoreResult<Option<FoodItem>> {
        patch.validate().map_err(StoreError::Validation)?;
        let mut tx = self.pool.begin().await?;
        let sql = format!("select {FOOD_COLUMNS} from foods where food_id = $1 for update");
        let Some(row) = sqlx::query(&sql)
            .bind(food_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let mut item = food_from_row(&row)?;
        patch.apply(&mut item);

        let sql = format!(
            r#"
            update foods
            set name = $2, description = $3, price_minor = $4, category = $5,
                image_url = $6, available = $7, updated_at_utc = now()
            where food_id = $1
            returning {FOOD_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(food_id)
            .bind(&item.name)
            .bind(&item.description)
            .bind(item.price_minor)
            .bind(&item.category)
            .bind(&item.image_url)
            .bind(item.available)
            .fetch_one(&mut *tx)
            .await?;
        let updated = food_from_row(&row)?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete_food(&self, food_id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let affected: Vec<Uuid> = sqlx::query_scalar(
            "select user_id from cart_items where food_id = $1 order by user_id",
        )
        .bind(food_id)
        .fetch_all(&mut *tx)
        .await?;

        for user_id in &affected {
            lock_cart(&mut tx, *user_id).await?;
        }
        sqlx::query("delete from cart_items where food_id = $1")
            .bind(food_id)
            .execute(&mut *tx)
            .await?;
        for user_id in &affected {
            recompute_cart_total(&mut tx, *user_id).await?;
        }

        let deleted = sqlx::query("delete from foods where food_id = $1")
            .bind(food_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        tx.commit().await?;

        if deleted {
            info!(%food_id, carts_touched = affected.len(), "food deleted");
        }
        Ok(deleted)
    }

    async fn categories(&self) -> StoreResult<Vec<CategorySummary>> {
        let rows = sqlx::query(
            r#"
            select category, count(*)::bigint as item_count
            from foods
            where available
            group by category
            order by category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(CategorySummary {
                    category: r.try_get("category")?,
                    item_count: r.try_get("item_count")?,
                })
            })
            .collect()
    }

    async fn get_cart(&self, user_id: Uuid) -> StoreResult<Cart> {
        let mut conn = self.pool.acquire().await?;
        load_cart(&mut conn, user_id).await
    }

    async fn add_cart_item(
        &self,
        user_id: Uuid,
        food_id: Uuid,
        quantity: i32,
        max_quantity: i32,
    ) -> StoreResult<Cart> {
        validate_quantity(quantity, max_quantity)?;
        let mut tx = self.pool.begin().await?;
        let price = available_price(&mut tx, food_id).await?;
        lock_cart(&mut tx, user_id).await?;

        let new_qty: i32 = sqlx::query_scalar(
            r#"
            insert into cart_items (user_id, food_id, unit_price_minor, quantity)
            values ($1, $2, $3, $4)
            on conflict (user_id, food_id) do update
              set quantity = cart_items.quantity + excluded.quantity,
                  unit_price_minor = excluded.unit_price_minor
            returning quantity
            "#,
        )
        .bind(user_id)
        .bind(food_id)
        .bind(price)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;
        // Rolls back with the transaction on failure.
        validate_quantity(new_qty, max_quantity)?;

        recompute_cart_total(&mut tx, user_id).await?;
        let cart = load_cart(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn set_cart_item(
        &self,
        user_id: Uuid,
        food_id: Uuid,
        quantity: i32,
        max_quantity: i32,
    ) -> StoreResult<Cart> {
        if quantity == 0 {
            return self.remove_cart_item(user_id, food_id).await;
        }
        validate_quantity(quantity, max_quantity)?;
        let mut tx = self.pool.begin().await?;
        let price = available_price(&mut tx, food_id).await?;
        lock_cart(&mut tx, user_id).await?;

        sqlx::query(
            r#"
            insert into cart_items (user_id, food_id, unit_price_minor, quantity)
            values ($1, $2, $3, $4)
            on conflict (user_id, food_id) do update
              set quantity = excluded.quantity,
                  unit_price_minor = excluded.unit_price_minor
            "#,
        )
        .bind(user_id)
        .bind(food_id)
        .bind(price)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        recompute_cart_total(&mut tx, user_id).await?;
        let cart = load_cart(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn remove_cart_item(&self, user_id: Uuid, food_id: Uuid) -> StoreResult<Cart> {
        let mut tx = self.pool.begin().await?;
        lock_cart(&mut tx, user_id).await?;
        let removed = sqlx::query("delete from cart_items where user_id = $1 and food_id = $2")
            .bind(user_id)
            .bind(food_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(StoreError::NotFound("cart item"));
        }
        recompute_cart_total(&mut tx, user_id).await?;
        let cart = load_cart(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("delete from carts where user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn place_order(&self, user_id: Uuid, draft: OrderDraft) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        lock_cart(&mut tx, user_id).await?;

        let rows = sqlx::query(
            r#"
            select i.food_id, i.quantity, f.name, f.price_minor, f.available
            from cart_items i
            join foods f on f.food_id = i.food_id
            where i.user_id = $1
            order by i.added_at_utc, i.food_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;
        if rows.is_empty() {
            return Err(StoreError::Validation("cart is empty".to_string()));
        }

        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name")?;
            if !row.try_get::<bool, _>("available")? {
                return Err(StoreError::Validation(format!(
                    "'{name}' is no longer available"
                )));
            }
            let unit_price_minor: i64 = row.try_get("price_minor")?;
            let quantity: i32 = row.try_get("quantity")?;
            lines.push(OrderLine {
                food_id: row.try_get("food_id")?,
                name,
                unit_price_minor,
                quantity,
                line_total_minor: plt_schemas::line_total(unit_price_minor, quantity)?,
            });
        }
        let (subtotal_minor, amount_minor) = order_amounts(&lines, draft.delivery_fee_minor)?;
        let payment_status = PaymentStatus::initial_for(draft.payment_method);

        sqlx::query(
            r#"
            insert into orders (
              order_id, user_id, subtotal_minor, delivery_fee_minor, amount_minor, currency,
              address, payment_method, payment_status, status
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(draft.order_id)
        .bind(user_id)
        .bind(subtotal_minor)
        .bind(draft.delivery_fee_minor)
        .bind(amount_minor)
        .bind(&draft.currency)
        .bind(Json(&draft.address))
        .bind(draft.payment_method.as_str())
        .bind(payment_status.as_str())
        .bind(OrderStatus::Placed.as_str())
        .execute(&mut *tx)
        .await
        .context("insert order failed")?;

        for (i, l) in lines.iter().enumerate() {
            sqlx::query(
                r#"
                insert into order_items (
                  order_id, line_no, food_id, name, unit_price_minor, quantity, line_total_minor
                ) values ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(draft.order_id)
            .bind(i as i32)
            .bind(l.food_id)
            .bind(&l.name)
            .bind(l.unit_price_minor)
            .bind(l.quantity)
            .bind(l.line_total_minor)
            .execute(&mut *tx)
            .await
            .context("insert order line failed")?;
        }

        // Checkout consumes the cart.
        sqlx::query("delete from carts where user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let order = fetch_order(&mut tx, draft.order_id, false)
            .await?
            .ok_or(StoreError::NotFound("order"))?;
        tx.commit().await?;
        Ok(order)
    }

    async fn restore_cart(&self, user_id: Uuid, order: &Order) -> StoreResult<Cart> {
        let mut tx = self.pool.begin().await?;
        lock_cart(&mut tx, user_id).await?;
        for l in &order.lines {
            sqlx::query(
                r#"
                insert into cart_items (user_id, food_id, unit_price_minor, quantity)
                select $1, f.food_id, f.price_minor, $3
                from foods f
                where f.food_id = $2 and f.available
                on conflict (user_id, food_id) do update
                  set quantity = cart_items.quantity + excluded.quantity,
                      unit_price_minor = excluded.unit_price_minor
                "#,
            )
            .bind(user_id)
            .bind(l.food_id)
            .bind(l.quantity)
            .execute(&mut *tx)
            .await?;
        }
        recompute_cart_total(&mut tx, user_id).await?;
        let cart = load_cart(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn attach_gateway_order(&self, order_id: Uuid, gateway_order_id: &str) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            "update orders set gateway_order_id = $2, updated_at_utc = now() where order_id = $1",
        )
        .bind(order_id)
        .bind(gateway_order_id)
        .execute(&mut *tx)
        .await;
        match res {
            Ok(r) if r.rows_affected() == 0 => return Err(StoreError::NotFound("order")),
            Ok(_) => {}
            Err(e) if is_unique_constraint_violation(&e, "uq_orders_gateway_order") => {
                return Err(StoreError::Conflict(
                    "gateway order id already attached to another order".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        }
        let order = fetch_order(&mut tx, order_id, false)
            .await?
            .ok_or(StoreError::NotFound("order"))?;
        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, order_id, false).await
    }

    async fn find_order_by_gateway_order(&self, gateway_order_id: &str) -> StoreResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("select {ORDER_COLUMNS} from orders where gateway_order_id = $1");
        let rows = sqlx::query(&sql)
            .bind(gateway_order_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(orders_with_lines(&mut conn, &rows).await?.pop())
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "select {ORDER_COLUMNS} from orders where user_id = $1 \
             order by created_at_utc desc, order_id desc"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        orders_with_lines(&mut conn, &rows).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "select {ORDER_COLUMNS} from orders where ($1::text is null or status = $1) \
             order by created_at_utc desc, order_id desc"
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&mut *conn)
            .await?;
        orders_with_lines(&mut conn, &rows).await
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        expected_from: Option<OrderStatus>,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = fetch_order(&mut tx, order_id, true)
            .await?
            .ok_or(StoreError::NotFound("order"))?;
        let unexpected = expected_from.is_some_and(|from| from != order.status);
        if unexpected || !order.status.can_transition_to(next) {
            return Err(StoreError::transition(order.status, next));
        }
        order.advance(next)?;

        sqlx::query(
            r#"
            update orders
            set status = $2, payment_status = $3, updated_at_utc = now()
            where order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .execute(&mut *tx)
        .await?;

        let order = fetch_order(&mut tx, order_id, false)
            .await?
            .ok_or(StoreError::NotFound("order"))?;
        tx.commit().await?;
        Ok(order)
    }

    async fn record_payment(&self, order_id: Uuid, outcome: PaymentOutcome) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = fetch_order(&mut tx, order_id, true)
            .await?
            .ok_or(StoreError::NotFound("order"))?;
        let changed = order
            .apply_payment(&outcome)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        if !changed {
            tx.commit().await?;
            return Ok(order);
        }

        sqlx::query(
            r#"
            update orders
            set payment_status = $2, gateway_payment_id = $3, updated_at_utc = now()
            where order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(order.payment_status.as_str())
        .bind(&order.gateway_payment_id)
        .execute(&mut *tx)
        .await?;

        let order = fetch_order(&mut tx, order_id, false)
            .await?
            .ok_or(StoreError::NotFound("order"))?;
        tx.commit().await?;
        Ok(order)
    }

    async fn dashboard_metrics(&self) -> StoreResult<DashboardMetrics> {
        let rows = sqlx::query("select status, count(*)::bigint as n from orders group by status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = Vec::with_capacity(rows.len());
        for r in rows {
            counts.push((
                OrderStatus::parse(&r.try_get::<String, _>("status")?)?,
                r.try_get::<i64, _>("n")?,
            ));
        }

        let revenue: i64 = sqlx::query_scalar(
            "select coalesce(sum(amount_minor), 0)::bigint from orders where payment_status = 'paid'",
        )
        .fetch_one(&self.pool)
        .await?;
        let customers: i64 =
            sqlx::query_scalar("select count(*)::bigint from users where role = 'customer'")
                .fetch_one(&self.pool)
                .await?;
        let foods: i64 = sqlx::query_scalar("select count(*)::bigint from foods")
            .fetch_one(&self.pool)
            .await?;

        Ok(DashboardMetrics::from_status_counts(
            &counts, revenue, customers, foods,
        ))
    }
}

/// Escape LIKE metacharacters so user input matches literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("dosa"), "dosa");
    }
}
