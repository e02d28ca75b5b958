use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Preparing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Placed,
        OrderStatus::Preparing,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| anyhow!("invalid order status: {}", s))
    }

    /// Legal kitchen/delivery edges. Delivered and Cancelled are terminal.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Placed, Preparing)
                | (Preparing, OutForDelivery)
                | (OutForDelivery, Delivered)
                | (Placed, Cancelled)
                | (Preparing, Cancelled)
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self,
            OrderStatus::Placed | OrderStatus::Preparing | OrderStatus::OutForDelivery
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "cod")]
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::CashOnDelivery => "cod",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "online" => Ok(PaymentMethod::Online),
            "cod" => Ok(PaymentMethod::CashOnDelivery),
            other => Err(anyhow!("invalid payment method: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    CashOnDelivery,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::CashOnDelivery => "cash_on_delivery",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "cash_on_delivery" => Ok(PaymentStatus::CashOnDelivery),
            other => Err(anyhow!("invalid payment status: {}", other)),
        }
    }

    /// Initial payment status for a freshly placed order.
    pub fn initial_for(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Online => PaymentStatus::Pending,
            PaymentMethod::CashOnDelivery => PaymentStatus::CashOnDelivery,
        }
    }
}

/// Result of a gateway callback or client-side verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Captured { payment_id: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DeliveryAddress {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("full_name", &self.full_name),
            ("phone", &self.phone),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("address.{field} must not be empty"));
            }
        }
        if !self
            .phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-'))
        {
            return Err("address.phone contains invalid characters".to_string());
        }
        Ok(())
    }
}

/// Price snapshot taken at checkout; independent of later catalog edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub food_id: Uuid,
    pub name: String,
    pub unit_price_minor: i64,
    pub quantity: i32,
    pub line_total_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub subtotal_minor: i64,
    pub delivery_fee_minor: i64,
    pub amount_minor: i64,
    pub currency: String,
    pub address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl Order {
    /// Apply a payment outcome in place. Returns false when nothing changed.
    ///
    /// A captured payment is never downgraded by a later failure report, and a
    /// repeated capture with the same payment id is a no-op.
    pub fn apply_payment(&mut self, outcome: &PaymentOutcome) -> Result<bool> {
        match outcome {
            PaymentOutcome::Captured { payment_id } => {
                if self.payment_status == PaymentStatus::Paid {
                    return match self.gateway_payment_id.as_deref() {
                        Some(existing) if existing == payment_id => Ok(false),
                        Some(existing) => Err(anyhow!(
                            "order already paid by {}, refusing {}",
                            existing,
                            payment_id
                        )),
                        None => Ok(false),
                    };
                }
                self.payment_status = PaymentStatus::Paid;
                self.gateway_payment_id = Some(payment_id.clone());
                Ok(true)
            }
            PaymentOutcome::Failed { .. } => {
                if matches!(
                    self.payment_status,
                    PaymentStatus::Paid | PaymentStatus::Failed
                ) {
                    return Ok(false);
                }
                self.payment_status = PaymentStatus::Failed;
                Ok(true)
            }
        }
    }

    /// Move to `next` if the edge is legal. Delivering a cash order settles it.
    pub fn advance(&mut self, next: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(anyhow!(
                "illegal order transition {} -> {}",
                self.status.as_str(),
                next.as_str()
            ));
        }
        self.status = next;
        if next == OrderStatus::Delivered && self.payment_status == PaymentStatus::CashOnDelivery {
            self.payment_status = PaymentStatus::Paid;
        }
        Ok(())
    }
}
