//! Database initialization, status and connection

use anyhow::{bail, Context, Result};
use sacco_business::{LogNotifier, ServiceContext};
use sacco_core::PolicySettings;
use sacco_persistence::{Database, SettingsRepo};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use crate::config::SaccoConfig;

/// Create the database, apply migrations and seed the policy settings
pub async fn init_database(config: &SaccoConfig, force: bool) -> Result<()> {
    let db_path = &config.database.path;
    if force && db_path.exists() {
        std::fs::remove_file(db_path).context("Failed to remove existing database")?;
        println!("🗑️  Removed existing database");
    }
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = Database::init_with_migrations(&config.database_url(), &config.database.events_dir)
        .await
        .context("Failed to initialize database")?;

    seed_settings(db.pool(), config).await?;
    db.pool().close().await;

    info!(path = %db_path.display(), "database initialized");
    Ok(())
}

/// First run only: stored settings are never overwritten
async fn seed_settings(pool: &SqlitePool, config: &SaccoConfig) -> Result<()> {
    if SettingsRepo::get(pool).await?.is_some() {
        return Ok(());
    }

    println!("🌱 Seeding default policy...");
    let settings = PolicySettings {
        sacco_name: config.sacco.name.clone(),
        currency: config.sacco.currency.clone(),
        ..PolicySettings::default()
    };
    SettingsRepo::save(pool, &settings).await?;
    Ok(())
}

/// Open an initialized database
pub async fn open(config: &SaccoConfig) -> Result<Database> {
    let db_path = &config.database.path;
    if !db_path.exists() {
        bail!(
            "Database not found at {}. Run 'sacco init' first.",
            db_path.display()
        );
    }

    let url = format!("sqlite:{}", db_path.display());
    Database::new(&url, &config.database.events_dir)
        .await
        .context("Failed to connect to database")
}

/// Service context with the configured outbound channels
pub fn context(db: &Database, config: &SaccoConfig) -> ServiceContext {
    ServiceContext::new(db).with_notifier(Arc::new(LogNotifier), config.notifications.channels.clone())
}

/// Show database status
pub async fn show_status(config: &SaccoConfig) -> Result<()> {
    let db_path = &config.database.path;
    if !db_path.exists() {
        println!("❌ Database not found at {:?}", db_path);
        println!("   Run 'sacco init' to create the database");
        return Ok(());
    }

    let db = open(config).await?;
    let pool = db.pool();

    println!("📊 Database Status");
    println!("   Path:   {:?}", db_path);
    println!("   Events: {:?}", config.database.events_dir);
    println!();

    for (label, table) in [
        ("Members", "members"),
        ("Applications", "applications"),
        ("Investments", "investments"),
        ("Loans", "loans"),
        ("Payments", "loan_payments"),
        ("Transactions", "transactions"),
        ("Dividends", "dividends"),
        ("Targets", "investment_targets"),
        ("Notifications", "notifications"),
    ] {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap_or((0,));
        println!("   {:<14} {}", format!("{}:", label), count.0);
    }

    let pending: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM applications WHERE status = 'pending'")
            .fetch_one(pool)
            .await
            .unwrap_or((0,));
    println!("   {:<14} {}", "Pending apps:", pending.0);

    let events = db.event_reader().read_all().map(|e| e.len()).unwrap_or(0);
    println!("   {:<14} {}", "Audit events:", events);

    pool.close().await;
    Ok(())
}
