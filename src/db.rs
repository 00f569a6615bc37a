use crate::error::{Result, StoreContext};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use std::str::FromStr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use uuid::Uuid;

pub type DbPool = SqlitePool;
pub type Tx = Transaction<'static, Sqlite>;

/// SQL expression for the store clock. Every `created_at`/`updated_at`/`last_read_at`
/// written by the application goes through this (or `format_timestamp`) so stored
/// timestamps share one lexically sortable layout.
macro_rules! store_now {
    () => {
        "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
    };
}
pub(crate) use store_now;

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
) -> std::result::Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    // Each connection to an in-memory database is its own database.
    let in_memory = database_url.contains(":memory:");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    pool_options.connect_with(options).await
}

pub async fn run_migrations(pool: &DbPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Formats a timestamp the same way `store_now!()` does.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Appends `(?, ?, ...)` with one bind per id.
pub fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[Uuid]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");
}

/// Counts statements issued against the store. Repositories record one hit per
/// round trip, which lets callers assert batching bounds.
#[derive(Clone, Default)]
pub struct QueryCounter {
    issued: Arc<AtomicU64>,
}

impl QueryCounter {
    pub fn record(&self, op: &'static str) {
        self.issued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(op, "store query");
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

/// Storage gateway handle passed to every component that touches the store.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    queries: QueryCounter,
}

impl Database {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            queries: QueryCounter::default(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn queries(&self) -> &QueryCounter {
        &self.queries
    }

    pub async fn begin(&self) -> Result<Tx> {
        self.pool.begin().await.context("begin")
    }
}
