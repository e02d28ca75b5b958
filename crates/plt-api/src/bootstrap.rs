//! Turn a validated `AppConfig` plus resolved secrets into an `AppState`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use plt_auth::TokenIssuer;
use plt_config::{secrets::ResolvedSecrets, AppConfig, GatewayKind, StorageBackend};
use plt_db::{MemStore, PgStore, Store};
use plt_payments::{DisabledGateway, PaymentGateway, RazorpayGateway};
use tracing::{info, warn};

use crate::state::{AppState, Settings};

pub async fn build_store(cfg: &AppConfig, secrets: &ResolvedSecrets) -> Result<Arc<dyn Store>> {
    match cfg.storage.backend {
        StorageBackend::Postgres => {
            let url = secrets
                .database_url
                .as_deref()
                .with_context(|| format!("SECRETS_MISSING env={}", cfg.database.url_env))?;
            let pool = plt_db::connect(url, cfg.database.max_connections).await?;
            let st = plt_db::status(&pool).await?;
            if !st.has_orders_table {
                bail!("DB_NOT_MIGRATED: run `plt db migrate` first");
            }
            info!(max_connections = cfg.database.max_connections, "postgres store ready");
            Ok(Arc::new(PgStore::new(pool)))
        }
        StorageBackend::Memory => {
            warn!("memory storage selected; all data is lost on restart");
            Ok(Arc::new(MemStore::new()))
        }
    }
}

pub fn build_gateway(cfg: &AppConfig, secrets: &ResolvedSecrets) -> Result<Arc<dyn PaymentGateway>> {
    match cfg.payments.gateway {
        GatewayKind::Razorpay => {
            let key_id = secrets
                .payments_key_id
                .clone()
                .with_context(|| format!("SECRETS_MISSING env={}", cfg.payments.key_id_env))?;
            let key_secret = secrets
                .payments_key_secret
                .clone()
                .with_context(|| format!("SECRETS_MISSING env={}", cfg.payments.key_secret_env))?;
            if secrets.payments_webhook_secret.is_none() {
                warn!(
                    env = %cfg.payments.webhook_secret_env,
                    "no webhook secret; gateway webhooks will be rejected"
                );
            }
            Ok(Arc::new(RazorpayGateway::new(
                cfg.payments.base_url.clone(),
                key_id,
                key_secret,
                secrets.payments_webhook_secret.clone(),
            )))
        }
        GatewayKind::Disabled => {
            info!("online payments disabled; cash on delivery only");
            Ok(Arc::new(DisabledGateway))
        }
    }
}

pub fn build_tokens(cfg: &AppConfig, secrets: &ResolvedSecrets) -> TokenIssuer {
    match secrets.jwt_secret.as_deref() {
        Some(secret) => TokenIssuer::new(secret.as_bytes(), cfg.auth.token_ttl_secs),
        None => {
            warn!(
                env = %cfg.auth.jwt_secret_env,
                "no token secret; using a per-process key, sessions end on restart"
            );
            TokenIssuer::ephemeral(cfg.auth.token_ttl_secs)
        }
    }
}

pub async fn build_state(cfg: &AppConfig, secrets: &ResolvedSecrets) -> Result<AppState> {
    let store = build_store(cfg, secrets).await?;
    let gateway = build_gateway(cfg, secrets)?;
    let tokens = build_tokens(cfg, secrets);
    Ok(AppState::new(
        store,
        gateway,
        tokens,
        Settings::from_config(cfg),
    ))
}
