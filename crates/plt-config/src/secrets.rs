//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (e.g. `"PLT_JWT_SECRET"`). Callers
//! invoke [`resolve_secrets`] once at startup and pass the result into
//! constructors. `Debug` output is redacted and error messages name the env
//! var, never its value.
//!
//! | Environment | Required                                                   |
//! |-------------|------------------------------------------------------------|
//! | production  | JWT secret; gateway key id + key secret when gateway is on; storage must not be `memory` |
//! | development | nothing; a missing JWT secret means an ephemeral one       |
//!
//! The webhook secret is optional everywhere. Without it the webhook route
//! rejects every delivery.

use anyhow::{bail, Result};

use crate::app::{AppConfig, Environment, GatewayKind, StorageBackend};

#[derive(Clone)]
pub struct ResolvedSecrets {
    pub jwt_secret: Option<String>,
    pub database_url: Option<String>,
    pub payments_key_id: Option<String>,
    pub payments_key_secret: Option<String>,
    pub payments_webhook_secret: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("database_url", &redact(&self.database_url))
            .field("payments_key_id", &redact(&self.payments_key_id))
            .field("payments_key_secret", &redact(&self.payments_key_secret))
            .field(
                "payments_webhook_secret",
                &redact(&self.payments_webhook_secret),
            )
            .finish()
    }
}

fn redact(v: &Option<String>) -> Option<&'static str> {
    v.as_ref().map(|_| "<REDACTED>")
}

/// Returns `None` if the variable is unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

pub fn resolve_secrets(cfg: &AppConfig) -> Result<ResolvedSecrets> {
    let secrets = ResolvedSecrets {
        jwt_secret: resolve_env(&cfg.auth.jwt_secret_env),
        database_url: resolve_env(&cfg.database.url_env),
        payments_key_id: resolve_env(&cfg.payments.key_id_env),
        payments_key_secret: resolve_env(&cfg.payments.key_secret_env),
        payments_webhook_secret: resolve_env(&cfg.payments.webhook_secret_env),
    };

    if cfg.storage.backend == StorageBackend::Postgres && secrets.database_url.is_none() {
        bail!(
            "SECRETS_MISSING env={}: database url is required for postgres storage",
            cfg.database.url_env
        );
    }

    if cfg.payments.gateway == GatewayKind::Razorpay {
        if secrets.payments_key_id.is_none() {
            bail!(
                "SECRETS_MISSING env={}: payments key id is required when the gateway is enabled",
                cfg.payments.key_id_env
            );
        }
        if secrets.payments_key_secret.is_none() {
            bail!(
                "SECRETS_MISSING env={}: payments key secret is required when the gateway is enabled",
                cfg.payments.key_secret_env
            );
        }
    }

    if cfg.app.environment == Environment::Production {
        if secrets.jwt_secret.is_none() {
            bail!(
                "SECRETS_MISSING env={}: token signing secret is required in production",
                cfg.auth.jwt_secret_env
            );
        }
        if cfg.storage.backend == StorageBackend::Memory {
            bail!("CONFIG_INVALID: memory storage is not allowed in production");
        }
    }

    Ok(secrets)
}
