use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub food_id: Uuid,
    pub name: String,
    pub unit_price_minor: i64,
    pub quantity: i32,
    pub line_total_minor: i64,
}

/// A user's cart. A user without a stored cart reads as an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: Uuid,
    pub lines: Vec<CartLine>,
    pub total_minor: i64,
    pub updated_at_utc: DateTime<Utc>,
}

/// `unit_price_minor * quantity`, failing on overflow or a negative quantity.
pub fn line_total(unit_price_minor: i64, quantity: i32) -> Result<i64> {
    if quantity < 0 {
        return Err(anyhow!("negative quantity: {}", quantity));
    }
    unit_price_minor
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| anyhow!("line total overflow: {} x {}", unit_price_minor, quantity))
}

pub fn cart_total(lines: &[CartLine]) -> Result<i64> {
    lines.iter().try_fold(0i64, |acc, l| {
        acc.checked_add(l.line_total_minor)
            .ok_or_else(|| anyhow!("cart total overflow"))
    })
}

impl Cart {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            lines: Vec::new(),
            total_minor: 0,
            updated_at_utc: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, food_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.food_id == food_id)
    }

    /// Recompute every line total and the denormalized cart total.
    pub fn recompute_total(&mut self) -> Result<()> {
        for l in self.lines.iter_mut() {
            l.line_total_minor = line_total(l.unit_price_minor, l.quantity)?;
        }
        self.total_minor = cart_total(&self.lines)?;
        Ok(())
    }

    /// True when the stored total matches the lines.
    pub fn is_consistent(&self) -> bool {
        self.lines
            .iter()
            .all(|l| line_total(l.unit_price_minor, l.quantity).ok() == Some(l.line_total_minor))
            && cart_total(&self.lines).ok() == Some(self.total_minor)
    }
}
