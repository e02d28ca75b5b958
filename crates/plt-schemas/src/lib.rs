//! Shared domain types for the Platter ordering API.
//!
//! Money is always carried as `i64` minor units (paise, cents). No floats.

pub mod cart;
pub mod catalog;
pub mod metrics;
pub mod order;
pub mod user;

pub use cart::{cart_total, line_total, Cart, CartLine};
pub use catalog::{CategorySummary, FoodFilter, FoodItem, FoodPatch, NewFood};
pub use metrics::DashboardMetrics;
pub use order::{
    DeliveryAddress, Order, OrderLine, OrderStatus, PaymentMethod, PaymentOutcome, PaymentStatus,
};
pub use user::{NewUser, Role, User};
