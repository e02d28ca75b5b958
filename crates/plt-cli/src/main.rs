use std::collections::HashSet;
use std::fs;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use plt_db::{PgStore, Store, StoreError};
use plt_schemas::{FoodFilter, FoodItem, NewFood, NewUser, Role};
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "plt")]
#[command(about = "Platter operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// User administration
    User {
        #[command(subcommand)]
        cmd: UserCmd,
    },

    /// Catalog maintenance
    Catalog {
        #[command(subcommand)]
        cmd: CatalogCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum UserCmd {
    /// Create a back-office account with the admin role.
    CreateAdmin {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum CatalogCmd {
    /// Load foods from a YAML or JSON file. Items whose name already exists
    /// in the same category are skipped.
    Import {
        #[arg(long)]
        file: String,

        /// Validate the file and print counts without touching the database.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

/// Either a bare list of foods or `{ foods: [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<NewFood>),
    Wrapped { foods: Vec<NewFood> },
}

impl CatalogFile {
    fn into_foods(self) -> Vec<NewFood> {
        match self {
            CatalogFile::List(v) => v,
            CatalogFile::Wrapped { foods } => foods,
        }
    }
}

fn read_catalog(path: &str) -> Result<Vec<NewFood>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read catalog failed: {path}"))?;
    // YAML is a superset of JSON, so one parser covers both.
    let file: CatalogFile =
        serde_yaml::from_str(&raw).with_context(|| format!("parse catalog failed: {path}"))?;
    let foods = file.into_foods();

    for (i, f) in foods.iter().enumerate() {
        if let Err(msg) = f.validate() {
            bail!("CATALOG_INVALID: item {} ('{}'): {}", i, f.name, msg);
        }
    }
    Ok(foods)
}

fn catalog_key(category: &str, name: &str) -> (String, String) {
    (category.trim().to_lowercase(), name.trim().to_lowercase())
}

/// Split incoming foods into those to insert and a count of duplicates,
/// matching on (category, name) case-insensitively against the catalog and
/// against earlier entries of the same file.
fn dedupe_catalog(existing: &[FoodItem], incoming: Vec<NewFood>) -> (Vec<NewFood>, usize) {
    let mut seen: HashSet<(String, String)> = existing
        .iter()
        .map(|e| catalog_key(&e.category, &e.name))
        .collect();
    let mut fresh = Vec::with_capacity(incoming.len());
    let mut skipped = 0usize;
    for food in incoming {
        if seen.insert(catalog_key(&food.category, &food.name)) {
            fresh.push(food);
        } else {
            skipped += 1;
        }
    }
    (fresh, skipped)
}

async fn store_from_env() -> Result<PgStore> {
    let pool = plt_db::connect_from_env().await?;
    Ok(PgStore::new(pool))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = plt_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = plt_db::status(&pool).await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate => {
                    plt_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = plt_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::User { cmd } => match cmd {
            UserCmd::CreateAdmin {
                name,
                email,
                password,
            } => {
                let min_len = plt_config::AppConfig::default().auth.min_password_len;
                let reg = plt_auth::validate_registration(&name, &email, &password, min_len)
                    .context("invalid admin account")?;
                let password_hash = plt_auth::hash_password(&reg.password)?;

                let store = store_from_env().await?;
                let user = match store
                    .create_user(NewUser {
                        name: reg.name,
                        email: reg.email,
                        password_hash,
                        role: Role::Admin,
                    })
                    .await
                {
                    Ok(u) => u,
                    Err(StoreError::Conflict(_)) => {
                        bail!("USER_EXISTS: an account with this email already exists")
                    }
                    Err(e) => return Err(e.into()),
                };
                println!("admin_created=true");
                println!("user_id={}", user.user_id);
                println!("email={}", user.email);
            }
        },

        Commands::Catalog { cmd } => match cmd {
            CatalogCmd::Import { file, dry_run } => {
                let foods = read_catalog(&file)?;
                if dry_run {
                    println!("dry_run=true");
                    println!("valid={}", foods.len());
                    return Ok(());
                }

                let store = store_from_env().await?;
                let existing = store
                    .list_foods(&FoodFilter {
                        include_unavailable: true,
                        ..FoodFilter::default()
                    })
                    .await?;

                let (fresh, skipped) = dedupe_catalog(&existing, foods);
                let mut imported = 0usize;
                for food in fresh {
                    store.create_food(food).await?;
                    imported += 1;
                }
                println!("imported={imported}");
                println!("skipped={skipped}");
            }
        },
    }

    Ok(())
}
