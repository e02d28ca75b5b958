//! Typed view over the merged config JSON.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    #[default]
    Disabled,
    Razorpay,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub environment: Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind_addr: String,
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://localhost:5174".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url_env: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url_env: "PLT_DATABASE_URL".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub jwt_secret_env: String,
    pub token_ttl_secs: i64,
    pub min_password_len: usize,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret_env: "PLT_JWT_SECRET".to_string(),
            token_ttl_secs: 7 * 24 * 60 * 60,
            min_password_len: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsSection {
    pub gateway: GatewayKind,
    pub base_url: String,
    pub currency: String,
    pub key_id_env: String,
    pub key_secret_env: String,
    pub webhook_secret_env: String,
}

impl Default for PaymentsSection {
    fn default() -> Self {
        Self {
            gateway: GatewayKind::Disabled,
            base_url: "https://api.razorpay.com".to_string(),
            currency: "INR".to_string(),
            key_id_env: "PLT_PAYMENTS_KEY_ID".to_string(),
            key_secret_env: "PLT_PAYMENTS_KEY_SECRET".to_string(),
            webhook_secret_env: "PLT_PAYMENTS_WEBHOOK_SECRET".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersSection {
    pub delivery_fee_minor: i64,
    pub max_item_quantity: i32,
}

impl Default for OrdersSection {
    fn default() -> Self {
        Self {
            delivery_fee_minor: 0,
            max_item_quantity: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSection {
    pub refresh_secs: u64,
    pub heartbeat_secs: u64,
}

impl Default for DashboardSection {
    fn default() -> Self {
        Self {
            refresh_secs: 30,
            heartbeat_secs: 15,
        }
    }
}

/// Every section falls back to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub storage: StorageSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub payments: PaymentsSection,
    pub orders: OrdersSection,
    pub dashboard: DashboardSection,
}

impl AppConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: AppConfig =
            serde_json::from_value(config_json.clone()).context("CONFIG_INVALID: shape mismatch")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        if self.orders.delivery_fee_minor < 0 {
            bail!("CONFIG_INVALID: orders.delivery_fee_minor must be >= 0");
        }
        if self.orders.max_item_quantity < 1 {
            bail!("CONFIG_INVALID: orders.max_item_quantity must be >= 1");
        }
        if self.auth.token_ttl_secs <= 0 {
            bail!("CONFIG_INVALID: auth.token_ttl_secs must be > 0");
        }
        if self.auth.min_password_len == 0 {
            bail!("CONFIG_INVALID: auth.min_password_len must be > 0");
        }
        if self.dashboard.refresh_secs == 0 || self.dashboard.heartbeat_secs == 0 {
            bail!("CONFIG_INVALID: dashboard intervals must be > 0");
        }
        if self.database.max_connections == 0 {
            bail!("CONFIG_INVALID: database.max_connections must be > 0");
        }
        let cur = self.payments.currency.trim();
        if cur.len() != 3 || !cur.chars().all(|c| c.is_ascii_uppercase()) {
            bail!("CONFIG_INVALID: payments.currency must be a 3-letter ISO code");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_addr
            .parse()
            .with_context(|| format!("CONFIG_INVALID: server.bind_addr '{}'", self.server.bind_addr))
    }
}
