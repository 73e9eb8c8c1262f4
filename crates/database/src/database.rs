use std::sync::Arc;

use booking_services::{BookingStore, PgBookingStore, SqliteBookingStore, StoreError};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row, SqlitePool};

/// Storage engines the server can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    /// PostgreSQL, selected by `postgres://` or `postgresql://` URLs
    Postgres,
    /// SQLite, selected by `sqlite:` URLs
    Sqlite,
}

/// Errors raised while preparing the database
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The URL names no supported engine
    #[error("Unsupported database URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Connecting or running the test query failed
    #[error("Database error: {0}")]
    Connection(#[from] sqlx::Error),

    /// Creating the schema failed
    #[error("Schema setup failed: {0}")]
    Schema(#[from] StoreError),
}

impl DatabaseKind {
    /// Picks the engine from the scheme of `url`
    pub fn from_url(url: &str) -> Result<Self, DatabaseError> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            "sqlite" => Ok(DatabaseKind::Sqlite),
            other => Err(DatabaseError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Connects to the database at `url`, checks the connection and creates the
/// booking tables if they are missing.
pub async fn create_booking_store(
    url: &str,
    max_connections: u32,
) -> Result<Arc<dyn BookingStore>, DatabaseError> {
    let store: Arc<dyn BookingStore> = match DatabaseKind::from_url(url)? {
        DatabaseKind::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await?;
            test_connection(&pool).await?;
            Arc::new(PgBookingStore::new(pool))
        }
        DatabaseKind::Sqlite => {
            let store = SqliteBookingStore::connect(url, max_connections)
                .await
                .map_err(|e| match e {
                    StoreError::Database(e) => DatabaseError::Connection(e),
                    other => DatabaseError::Schema(other),
                })?;
            test_sqlite_connection(store.pool()).await?;
            Arc::new(store)
        }
    };

    store.init_schema().await?;
    log::info!("Booking schema ready");

    Ok(store)
}

/// Tests a PostgreSQL connection by executing a simple query.
pub async fn test_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    let row = sqlx::query("SELECT 1 as test").fetch_one(pool).await?;

    let test_value: i32 = row.get("test");
    log::info!("Database connection successful! Test value: {}", test_value);

    Ok(())
}

/// Tests a SQLite connection by executing a simple query.
pub async fn test_sqlite_connection(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let row = sqlx::query("SELECT 1 as test").fetch_one(pool).await?;

    let test_value: i64 = row.get("test");
    log::info!("Database connection successful! Test value: {}", test_value);

    Ok(())
}
