use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderStatus, PaymentStatus};

/// Aggregate counters shown on the back-office dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_orders: i64,
    /// Every status key is present, zero-filled.
    pub orders_by_status: BTreeMap<String, i64>,
    /// Placed + preparing + out for delivery.
    pub open_orders: i64,
    /// Sum of `amount_minor` over paid orders.
    pub revenue_minor: i64,
    pub total_customers: i64,
    pub total_foods: i64,
    pub generated_at_utc: DateTime<Utc>,
}

impl DashboardMetrics {
    pub fn from_status_counts(
        counts: &[(OrderStatus, i64)],
        revenue_minor: i64,
        total_customers: i64,
        total_foods: i64,
    ) -> Self {
        let mut orders_by_status: BTreeMap<String, i64> = OrderStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut total_orders = 0;
        let mut open_orders = 0;
        for (status, n) in counts {
            *orders_by_status
                .entry(status.as_str().to_string())
                .or_insert(0) += n;
            total_orders += n;
            if status.is_open() {
                open_orders += n;
            }
        }

        Self {
            total_orders,
            orders_by_status,
            open_orders,
            revenue_minor,
            total_customers,
            total_foods,
            generated_at_utc: Utc::now(),
        }
    }

    pub fn aggregate<'a>(
        orders: impl IntoIterator<Item = &'a Order>,
        total_customers: i64,
        total_foods: i64,
    ) -> Self {
        let mut counts: BTreeMap<OrderStatus, i64> = BTreeMap::new();
        let mut revenue_minor: i64 = 0;
        for o in orders {
            *counts.entry(o.status).or_insert(0) += 1;
            if o.payment_status == PaymentStatus::Paid {
                revenue_minor = revenue_minor.saturating_add(o.amount_minor);
            }
        }
        let counts: Vec<(OrderStatus, i64)> = counts.into_iter().collect();
        Self::from_status_counts(&counts, revenue_minor, total_customers, total_foods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_counts_are_zero_filled() {
        let m = DashboardMetrics::from_status_counts(&[], 0, 3, 7);
        assert_eq!(m.total_orders, 0);
        assert_eq!(m.orders_by_status.len(), OrderStatus::ALL.len());
        assert!(m.orders_by_status.values().all(|v| *v == 0));
        assert_eq!(m.total_customers, 3);
        assert_eq!(m.total_foods, 7);
    }

    #[test]
    fn open_orders_exclude_terminal_states() {
        let m = DashboardMetrics::from_status_counts(
            &[
                (OrderStatus::Placed, 2),
                (OrderStatus::OutForDelivery, 1),
                (OrderStatus::Delivered, 5),
                (OrderStatus::Cancelled, 1),
            ],
            0,
            0,
            0,
        );
        assert_eq!(m.total_orders, 9);
        assert_eq!(m.open_orders, 3);
        assert_eq!(m.orders_by_status["delivered"], 5);
    }
}
