use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn temp_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("tempfile");
    f.write_all(contents.as_bytes()).expect("write");
    f
}

#[allow(deprecated)]
#[test]
fn catalog_dry_run_accepts_yaml_list() {
    let file = temp_file(
        ".yaml",
        r#"
- name: Masala Dosa
  description: Crisp rice crepe
  price_minor: 12000
  category: Mains
- name: Mango Lassi
  price_minor: 6000
  category: Drinks
  available: false
"#,
    );

    Command::cargo_bin("plt")
        .unwrap()
        .args(["catalog", "import", "--dry-run", "--file"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("dry_run=true"))
        .stdout(predicate::str::contains("valid=2"));
}

#[allow(deprecated)]
#[test]
fn catalog_dry_run_accepts_wrapped_json() {
    let file = temp_file(
        ".json",
        r#"{"foods": [{"name": "Idli", "price_minor": 5500, "category": "Breakfast"}]}"#,
    );

    Command::cargo_bin("plt")
        .unwrap()
        .args(["catalog", "import", "--dry-run", "--file"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("valid=1"));
}

#[allow(deprecated)]
#[test]
fn catalog_rejects_invalid_items() {
    let file = temp_file(
        ".yaml",
        "- name: Broken\n  price_minor: -5\n  category: Mains\n",
    );

    Command::cargo_bin("plt")
        .unwrap()
        .args(["catalog", "import", "--dry-run", "--file"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("CATALOG_INVALID"));
}

/// Validation happens before any database access, so this needs no DB.
#[allow(deprecated)]
#[test]
fn create_admin_rejects_weak_password() {
    Command::cargo_bin("plt")
        .unwrap()
        .env_remove(plt_db_env())
        .args([
            "user",
            "create-admin",
            "--name",
            "Ops",
            "--email",
            "ops@example.com",
            "--password",
            "short",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid admin account"));
}

fn plt_db_env() -> &'static str {
    "PLT_DATABASE_URL"
}

/// DB-backed: skipped if PLT_DATABASE_URL is not set.
#[allow(deprecated)]
#[test]
fn db_migrate_then_status_reports_orders_table() {
    let url = match std::env::var(plt_db_env()) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: PLT_DATABASE_URL not set");
            return;
        }
    };

    Command::cargo_bin("plt")
        .unwrap()
        .env(plt_db_env(), &url)
        .args(["db", "migrate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("migrations_applied=true"));

    Command::cargo_bin("plt")
        .unwrap()
        .env(plt_db_env(), &url)
        .args(["db", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("db_ok=true has_orders_table=true"));

    let email = format!("ops-{}@example.com", uuid::Uuid::new_v4());
    Command::cargo_bin("plt")
        .unwrap()
        .env(plt_db_env(), &url)
        .args([
            "user",
            "create-admin",
            "--name",
            "Ops",
            "--email",
            &email,
            "--password",
            "a long admin password",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("admin_created=true"));
}

/// DB-backed: skipped if PLT_DATABASE_URL is not set.
#[allow(deprecated)]
#[test]
fn catalog_import_skips_repeats_in_file_and_catalog() {
    let url = match std::env::var(plt_db_env()) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: PLT_DATABASE_URL not set");
            return;
        }
    };

    Command::cargo_bin("plt")
        .unwrap()
        .env(plt_db_env(), &url)
        .args(["db", "migrate"])
        .assert()
        .success();

    let tag = uuid::Uuid::new_v4().simple().to_string();
    let file = temp_file(
        ".yaml",
        &format!(
            r#"
foods:
  - name: Filter Coffee {tag}
    price_minor: 3000
    category: Drinks
  - name: filter coffee {tag}
    price_minor: 3500
    category: DRINKS
"#
        ),
    );

    Command::cargo_bin("plt")
        .unwrap()
        .env(plt_db_env(), &url)
        .args(["catalog", "import", "--file"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("imported=1"))
        .stdout(predicate::str::contains("skipped=1"));

    Command::cargo_bin("plt")
        .unwrap()
        .env(plt_db_env(), &url)
        .args(["catalog", "import", "--file"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("imported=0"))
        .stdout(predicate::str::contains("skipped=2"));
}
