//! # Sacco Persistence
//!
//! Persistence layer for the SACCO back office: SQLite state plus a JSONL
//! audit trail.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Database                               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐ │
//! │  │   SQLite    │    │    JSONL    │    │     Repos       │ │
//! │  │  (state)    │    │  (audit)    │    │   (queries)     │ │
//! │  └─────────────┘    └─────────────┘    └─────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sacco_persistence::{Database, MemberRepo};
//!
//! let db = Database::init_with_migrations("sqlite:sacco.db", "data/events").await?;
//! let members = MemberRepo::list_all(db.pool()).await?;
//! db.events().append(&event)?;
//! ```

pub mod error;
pub mod events;
pub mod sqlite;

pub use error::{PersistenceError, PersistenceResult};
pub use events::{AuditSummary, EventFilter, EventReader, EventStore};
pub use sqlite::{
    init_database, init_memory_database, next_id, ApplicationRepo, CollateralRepo, CommentRepo,
    DeliveryRepo, DividendRepo, GuarantorRepo, InvestmentRepo, LoanRepo, LoanTypeRepo, MemberRepo,
    NotificationRepo, PaymentRepo, SettingsRepo, TargetRepo, TransactionRepo,
};

use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

/// Database facade - unified access to SQLite and the audit trail
pub struct Database {
    pool: SqlitePool,
    event_store: Arc<EventStore>,
}

impl Database {
    /// Connect to an existing database
    ///
    /// # Arguments
    /// * `db_url` - SQLite database URL (e.g., "sqlite:sacco.db")
    /// * `events_path` - Directory holding the JSONL audit files
    pub async fn new<Q: AsRef<Path>>(db_url: &str, events_path: Q) -> PersistenceResult<Self> {
        let pool = sqlite::create_pool(db_url).await?;
        let event_store = Arc::new(EventStore::new(events_path)?);

        Ok(Self { pool, event_store })
    }

    /// Open or create the database and apply migrations
    pub async fn init_with_migrations<Q: AsRef<Path>>(
        db_url: &str,
        events_path: Q,
    ) -> PersistenceResult<Self> {
        let pool = init_database(db_url).await?;
        let event_store = Arc::new(EventStore::new(events_path)?);

        Ok(Self { pool, event_store })
    }

    /// In-memory database with events under `events_path`
    pub async fn in_memory<Q: AsRef<Path>>(events_path: Q) -> PersistenceResult<Self> {
        let pool = init_memory_database().await?;
        let event_store = Arc::new(EventStore::new(events_path)?);

        Ok(Self { pool, event_store })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &EventStore {
        &self.event_store
    }

    /// Shared handle on the event store
    pub fn event_store(&self) -> Arc<EventStore> {
        Arc::clone(&self.event_store)
    }

    /// Event reader for replaying/auditing
    pub fn event_reader(&self) -> EventReader {
        EventReader::new(self.event_store.base_path())
    }
}
