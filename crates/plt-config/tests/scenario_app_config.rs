//! Typed config defaults, validation, and secret resolution.
//!
//! Failure tests use sentinel env var names that are never set anywhere, and
//! success tests point at `PATH`, which is always set. No `set_var` races.

use plt_config::secrets::resolve_secrets;
use plt_config::{
    load_layered_yaml_from_strings, AppConfig, Environment, GatewayKind, StorageBackend,
};

fn load(yaml: &str) -> anyhow::Result<AppConfig> {
    let loaded = load_layered_yaml_from_strings(&[yaml])?;
    AppConfig::from_json(&loaded.config_json)
}

#[test]
fn empty_config_uses_defaults() {
    let cfg = load("{}").unwrap();
    assert_eq!(cfg.app.environment, Environment::Development);
    assert_eq!(cfg.storage.backend, StorageBackend::Postgres);
    assert_eq!(cfg.payments.gateway, GatewayKind::Disabled);
    assert_eq!(cfg.payments.currency, "INR");
    assert_eq!(cfg.orders.max_item_quantity, 50);
    assert_eq!(cfg.auth.token_ttl_secs, 604_800);
    assert_eq!(cfg.bind_addr().unwrap().port(), 8080);
}

#[test]
fn invalid_values_are_rejected() {
    for (yaml, needle) in [
        ("orders:\n  delivery_fee_minor: -1\n", "delivery_fee_minor"),
        ("orders:\n  max_item_quantity: 0\n", "max_item_quantity"),
        ("server:\n  bind_addr: \"not-an-addr\"\n", "bind_addr"),
        ("payments:\n  currency: \"rupees\"\n", "currency"),
        ("dashboard:\n  refresh_secs: 0\n", "dashboard"),
    ] {
        let err = format!("{:#}", load(yaml).unwrap_err());
        assert!(err.contains(needle), "yaml={yaml:?} err={err}");
    }
}

#[test]
fn unknown_enum_value_is_a_shape_error() {
    let err = format!("{:#}", load("storage:\n  backend: \"sqlite\"\n").unwrap_err());
    assert!(err.contains("CONFIG_INVALID"), "got: {err}");
}

#[test]
fn development_memory_needs_no_secrets() {
    let cfg = load(
        r#"
storage:
  backend: memory
auth:
  jwt_secret_env: "PLT_SENTINEL_JWT_NEVER_SET_D1"
"#,
    )
    .unwrap();
    let s = resolve_secrets(&cfg).unwrap();
    assert!(s.jwt_secret.is_none());
}

#[test]
fn production_requires_jwt_secret_and_names_the_var() {
    let cfg = load(
        r#"
app:
  environment: production
database:
  url_env: "PATH"
auth:
  jwt_secret_env: "PLT_SENTINEL_JWT_NEVER_SET_P1"
"#,
    )
    .unwrap();
    let err = resolve_secrets(&cfg).unwrap_err().to_string();
    assert!(err.contains("SECRETS_MISSING"), "got: {err}");
    assert!(err.contains("PLT_SENTINEL_JWT_NEVER_SET_P1"), "got: {err}");
}

#[test]
fn production_rejects_memory_storage() {
    let cfg = load(
        r#"
app:
  environment: production
storage:
  backend: memory
auth:
  jwt_secret_env: "PATH"
"#,
    )
    .unwrap();
    let err = resolve_secrets(&cfg).unwrap_err().to_string();
    assert!(err.contains("memory storage"), "got: {err}");
}

#[test]
fn enabled_gateway_requires_keys() {
    let cfg = load(
        r#"
storage:
  backend: memory
payments:
  gateway: razorpay
  key_id_env: "PATH"
  key_secret_env: "PLT_SENTINEL_PAY_SECRET_NEVER_SET_G1"
"#,
    )
    .unwrap();
    let err = resolve_secrets(&cfg).unwrap_err().to_string();
    assert!(err.contains("PLT_SENTINEL_PAY_SECRET_NEVER_SET_G1"), "got: {err}");
}

#[test]
fn postgres_requires_database_url() {
    let cfg = load(
        r#"
database:
  url_env: "PLT_SENTINEL_DB_URL_NEVER_SET_X1"
"#,
    )
    .unwrap();
    let err = resolve_secrets(&cfg).unwrap_err().to_string();
    assert!(err.contains("PLT_SENTINEL_DB_URL_NEVER_SET_X1"), "got: {err}");
}

#[test]
fn debug_output_is_redacted() {
    let cfg = load(
        r#"
storage:
  backend: memory
auth:
  jwt_secret_env: "PATH"
"#,
    )
    .unwrap();
    let s = resolve_secrets(&cfg).unwrap();
    let path_value = std::env::var("PATH").unwrap();
    let dbg = format!("{:?}", s);
    assert!(dbg.contains("<REDACTED>"));
    assert!(!dbg.contains(&path_value));
}
