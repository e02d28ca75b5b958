//! In-process store. One lock around the whole dataset, so every trait
//! method is atomic the same way a Postgres transaction is.

use std::collections::HashMap;

use chrono::Utc;
use plt_schemas::{
    Cart, CartLine, CategorySummary, DashboardMetrics, FoodFilter, FoodItem, FoodPatch, NewFood,
    NewUser, Order, OrderLine, OrderStatus, PaymentOutcome, PaymentStatus, Role, User,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{validate_quantity, OrderDraft, Store, StoreError, StoreResult};

#[derive(Default)]
struct MemInner {
    users: HashMap<Uuid, (User, String)>,
    foods: HashMap<Uuid, FoodItem>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
}

#[derive(Default)]
pub struct MemStore {
    inner: RwLock<MemInner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemInner {
    fn available_food(&self, food_id: Uuid) -> StoreResult<&FoodItem> {
        match self.foods.get(&food_id) {
            Some(f) if f.available => Ok(f),
            Some(_) => Err(StoreError::Validation(format!(
                "food {food_id} is not available"
            ))),
            None => Err(StoreError::NotFound("food")),
        }
    }

    /// Cart with display names refreshed from the catalog.
    fn read_cart(&self, user_id: Uuid) -> Cart {
        let mut cart = self
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Cart::empty(user_id));
        for line in cart.lines.iter_mut() {
            if let Some(f) = self.foods.get(&line.food_id) {
                line.name = f.name.clone();
            }
        }
        cart
    }

    fn cart_mut(&mut self, user_id: Uuid) -> &mut Cart {
        self.carts
            .entry(user_id)
            .or_insert_with(|| Cart::empty(user_id))
    }

    fn sorted_orders<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<Order> {
        let mut out: Vec<Order> = orders.cloned().collect();
        out.sort_by(|a, b| {
            b.created_at_utc
                .cmp(&a.created_at_utc)
                .then_with(|| b.order_id.cmp(&a.order_id))
        });
        out
    }
}

fn finish_cart_mutation(cart: &mut Cart) -> StoreResult<()> {
    cart.recompute_total()?;
    cart.updated_at_utc = Utc::now();
    Ok(())
}

#[async_trait::async_trait]
impl Store for MemStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut g = self.inner.write().await;
        if g.users.values().any(|(u, _)| u.email == new.email) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        let user = User {
            user_id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            role: new.role,
            created_at_utc: Utc::now(),
        };
        g.users
            .insert(user.user_id, (user.clone(), new.password_hash));
        Ok(user)
    }

    async fn find_credentials(&self, email: &str) -> StoreResult<Option<(User, String)>> {
        let g = self.inner.read().await;
        Ok(g.users.values().find(|(u, _)| u.email == email).cloned())
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let g = self.inner.read().await;
        Ok(g.users.get(&user_id).map(|(u, _)| u.clone()))
    }

    async fn list_foods(&self, filter: &FoodFilter) -> StoreResult<Vec<FoodItem>> {
        let g = self.inner.read().await;
        let mut out: Vec<FoodItem> = g
            .foods
            .values()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.food_id.cmp(&b.food_id))
        });
        Ok(out)
    }

    async fn get_food(&self, food_id: Uuid) -> StoreResult<Option<FoodItem>> {
        Ok(self.inner.read().await.foods.get(&food_id).cloned())
    }

    async fn create_food(&self, new: NewFood) -> StoreResult<FoodItem> {
        new.validate().map_err(StoreError::Validation)?;
        let now = Utc::now();
        let item = FoodItem {
            food_id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            description: new.description,
            price_minor: new.price_minor,
            category: new.category.trim().to_string(),
            image_url: new.image_url,
            available: new.available,
            created_at_utc: now,
            updated_at_utc: now,
        };
        self.inner
            .write()
            .await
            .foods
            .insert(item.food_id, item.clone());
        Ok(item)
    }

    async fn update_food(&self, food_id: Uuid, patch: FoodPatch) -> StoreResult<Option<FoodItem>> {
        patch.validate().map_err(StoreError::Validation)?;
        let mut g = self.inner.write().await;
        let Some(item) = g.foods.get_mut(&food_id) else {
            return Ok(None);
        };
        patch.apply(item);
        item.updated_at_utc = Utc::now();
        Ok(Some(item.clone()))
    }

    async fn delete_food(&self, food_id: Uuid) -> StoreResult<bool> {
        let mut g = self.inner.write().await;
        if g.foods.remove(&food_id).is_none() {
            return Ok(false);
        }
        for cart in g.carts.values_mut() {
            let before = cart.lines.len();
            cart.lines.retain(|l| l.food_id != food_id);
            if cart.lines.len() != before {
                finish_cart_mutation(cart)?;
            }
        }
        g.carts.retain(|_, c| !c.is_empty());
        Ok(true)
    }

    async fn categories(&self) -> StoreResult<Vec<CategorySummary>> {
        let g = self.inner.read().await;
        let mut counts: std::collections::BTreeMap<String, i64> = Default::default();
        for f in g.foods.values().filter(|f| f.available) {
            *counts.entry(f.category.clone()).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(category, item_count)| CategorySummary {
                category,
                item_count,
            })
            .collect())
    }

    async fn get_cart(&self, user_id: Uuid) -> StoreResult<Cart> {
        Ok(self.inner.read().await.read_cart(user_id))
    }

    async fn add_cart_item(
        &self,
        user_id: Uuid,
        food_id: Uuid,
        quantity: i32,
        max_quantity: i32,
    ) -> StoreResult<Cart> {
        validate_quantity(quantity, max_quantity)?;
        let mut g = self.inner.write().await;
        let food = g.available_food(food_id)?.clone();

        let cart = g.cart_mut(user_id);
        match cart.lines.iter_mut().find(|l| l.food_id == food_id) {
            Some(line) => {
                let next = line.quantity.saturating_add(quantity);
                validate_quantity(next, max_quantity)?;
                line.quantity = next;
                line.unit_price_minor = food.price_minor;
            }
            None => cart.lines.push(CartLine {
                food_id,
                name: food.name.clone(),
                unit_price_minor: food.price_minor,
                quantity,
                line_total_minor: 0,
            }),
        }
        finish_cart_mutation(cart)?;
        Ok(g.read_cart(user_id))
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
        let mut g = self.inner.write().await;
        let food = g.available_food(food_id)?.clone();

        let cart = g.cart_mut(user_id);
        match cart.lines.iter_mut().find(|l| l.food_id == food_id) {
            Some(line) => {
                line.quantity = quantity;
                line.unit_price_minor = food.price_minor;
            }
            None => cart.lines.push(CartLine {
                food_id,
                name: food.name.clone(),
                unit_price_minor: food.price_minor,
                quantity,
                line_total_minor: 0,
            }),
        }
        finish_cart_mutation(cart)?;
        Ok(g.read_cart(user_id))
    }

    async fn remove_cart_item(&self, user_id: Uuid, food_id: Uuid) -> StoreResult<Cart> {
        let mut g = self.inner.write().await;
        let Some(cart) = g.carts.get_mut(&user_id) else {
            return Err(StoreError::NotFound("cart item"));
        };
        let before = cart.lines.len();
        cart.lines.retain(|l| l.food_id != food_id);
        if cart.lines.len() == before {
            return Err(StoreError::NotFound("cart item"));
        }
        finish_cart_mutation(cart)?;
        Ok(g.read_cart(user_id))
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
        self.inner.write().await.carts.remove(&user_id);
        Ok(())
    }

    async fn place_order(&self, user_id: Uuid, draft: OrderDraft) -> StoreResult<Order> {
        let mut g = self.inner.write().await;
        let cart = g.read_cart(user_id);
        if cart.is_empty() {
            return Err(StoreError::Validation("cart is empty".to_string()));
        }
        if g.orders.contains_key(&draft.order_id) {
            return Err(StoreError::Conflict("order id already used".to_string()));
        }

        let mut lines = Vec::with_capacity(cart.lines.len());
        for l in &cart.lines {
            let food = g.available_food(l.food_id).map_err(|_| {
                StoreError::Validation(format!("'{}' is no longer available", l.name))
            })?;
            lines.push(OrderLine {
                food_id: food.food_id,
                name: food.name.clone(),
                unit_price_minor: food.price_minor,
                quantity: l.quantity,
                line_total_minor: plt_schemas::line_total(food.price_minor, l.quantity)?,
            });
        }
        let (subtotal_minor, amount_minor) = order_amounts(&lines, draft.delivery_fee_minor)?;

        let now = Utc::now();
        let order = Order {
            order_id: draft.order_id,
            user_id,
            lines,
            subtotal_minor,
            delivery_fee_minor: draft.delivery_fee_minor,
            amount_minor,
            currency: draft.currency,
            address: draft.address,
            payment_method: draft.payment_method,
            payment_status: PaymentStatus::initial_for(draft.payment_method),
            status: OrderStatus::Placed,
            gateway_order_id: None,
            gateway_payment_id: None,
            created_at_utc: now,
            updated_at_utc: now,
        };
        g.orders.insert(order.order_id, order.clone());
        g.carts.remove(&user_id);
        Ok(order)
    }

    async fn restore_cart(&self, user_id: Uuid, order: &Order) -> StoreResult<Cart> {
        let mut g = self.inner.write().await;
        let mut restored: Vec<(FoodItem, i32)> = Vec::new();
        for l in &order.lines {
            if let Ok(food) = g.available_food(l.food_id) {
                restored.push((food.clone(), l.quantity));
            }
        }
        let cart = g.cart_mut(user_id);
        for (food, quantity) in restored {
            match cart.lines.iter_mut().find(|l| l.food_id == food.food_id) {
                Some(line) => {
                    line.quantity = line.quantity.saturating_add(quantity);
                    line.unit_price_minor = food.price_minor;
                }
                None => cart.lines.push(CartLine {
                    food_id: food.food_id,
                    name: food.name,
                    unit_price_minor: food.price_minor,
                    quantity,
                    line_total_minor: 0,
                }),
            }
        }
        finish_cart_mutation(cart)?;
        if cart.is_empty() {
            g.carts.remove(&user_id);
        }
        Ok(g.read_cart(user_id))
    }

    async fn attach_gateway_order(&self, order_id: Uuid, gateway_order_id: &str) -> StoreResult<Order> {
        let mut g = self.inner.write().await;
        if g.orders.values().any(|o| {
            o.order_id != order_id && o.gateway_order_id.as_deref() == Some(gateway_order_id)
        }) {
            return Err(StoreError::Conflict(
                "gateway order id already attached to another order".to_string(),
            ));
        }
        let order = g
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::NotFound("order"))?;
        order.gateway_order_id = Some(gateway_order_id.to_string());
        order.updated_at_utc = Utc::now();
        Ok(order.clone())
    }

    async fn get_order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&order_id).cloned())
    }

    async fn find_order_by_gateway_order(&self, gateway_order_id: &str) -> StoreResult<Option<Order>> {
        let g = self.inner.read().await;
        Ok(g.orders
            .values()
            .find(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let g = self.inner.read().await;
        Ok(MemInner::sorted_orders(
            g.orders.values().filter(|o| o.user_id == user_id),
        ))
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> StoreResult<Vec<Order>> {
        let g = self.inner.read().await;
        Ok(MemInner::sorted_orders(
            g.orders
                .values()
                .filter(|o| status.map_or(true, |s| o.status == s)),
        ))
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        expected_from: Option<OrderStatus>,
    ) -> StoreResult<Order> {
        let mut g = self.inner.write().await;
        let order = g
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::NotFound("order"))?;
        let unexpected = expected_from.is_some_and(|from| from != order.status);
        if unexpected || !order.status.can_transition_to(next) {
            return Err(StoreError::transition(order.status, next));
        }
        order.advance(next)?;
        order.updated_at_utc = Utc::now();
        Ok(order.clone())
    }

    async fn record_payment(&self, order_id: Uuid, outcome: PaymentOutcome) -> StoreResult<Order> {
        let mut g = self.inner.write().await;
        let order = g
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::NotFound("order"))?;
        let changed = order
            .apply_payment(&outcome)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        if changed {
            order.updated_at_utc = Utc::now();
        }
        Ok(order.clone())
    }

    async fn dashboard_metrics(&self) -> StoreResult<DashboardMetrics> {
        let g = self.inner.read().await;
        let customers = g
            .users
            .values()
            .filter(|(u, _)| u.role == Role::Customer)
            .count() as i64;
        Ok(DashboardMetrics::aggregate(
            g.orders.values(),
            customers,
            g.foods.len() as i64,
        ))
    }
}

pub(crate) fn order_amounts(lines: &[OrderLine], delivery_fee_minor: i64) -> StoreResult<(i64, i64)> {
    let subtotal = lines
        .iter()
        .try_fold(0i64, |acc, l| acc.checked_add(l.line_total_minor))
        .ok_or_else(|| StoreError::Validation("order total overflow".to_string()))?;
    let amount = subtotal
        .checked_add(delivery_fee_minor)
        .ok_or_else(|| StoreError::Validation("order total overflow".to_string()))?;
    Ok((subtotal, amount))
}
