//! Persistence boundary of the reservation engine.
//!
//! The engine never locks anything itself. It relies on two properties of
//! the store behind these traits: transactions commit or roll back as a
//! whole, and the claim table rejects a second row for the same date.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{NightSet, Stay, StayId};

/// PostgreSQL-backed store
pub mod postgres;
/// SQLite-backed store
pub mod sqlite;

pub use postgres::PgBookingStore;
pub use sqlite::SqliteBookingStore;

/// Errors raised by a booking store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A claim row for an already claimed date was rejected
    #[error("Unique constraint violated")]
    UniqueViolation,

    /// The engine aborted the transaction to break a deadlock or a
    /// serialization conflict with a concurrent transaction
    #[error("Transaction aborted by a concurrent transaction")]
    Contention,

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

/// PostgreSQL `deadlock_detected`
const DEADLOCK_DETECTED: &str = "40P01";
/// PostgreSQL `serialization_failure`
const SERIALIZATION_FAILURE: &str = "40001";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let (unique, contention) = match err.as_database_error() {
            Some(db_err) => (
                db_err.is_unique_violation(),
                matches!(
                    db_err.code().as_deref(),
                    Some(DEADLOCK_DETECTED | SERIALIZATION_FAILURE)
                ),
            ),
            None => (false, false),
        };

        if unique {
            StoreError::UniqueViolation
        } else if contention {
            StoreError::Contention
        } else {
            StoreError::Database(err)
        }
    }
}

/// A storage engine able to open transactions over stays and date claims
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Opens a new transaction
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Reads committed claims with `start <= date <= end`, outside any transaction
    async fn claimed_between(&self, start: NaiveDate, end: NaiveDate)
    -> Result<NightSet, StoreError>;

    /// Creates the `stays` and `date_claims` tables if they do not exist
    async fn init_schema(&self) -> Result<(), StoreError>;
}

/// An open store transaction. Dropping it without calling
/// [`StoreTransaction::commit`] rolls every change back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Inserts one claim per night in a single statement. Fails with
    /// [`StoreError::UniqueViolation`] if any night is already claimed.
    async fn insert_claims(&mut self, nights: &NightSet, owner: StayId) -> Result<(), StoreError>;

    /// Deletes the claim on `night` if `owner` holds it; returns whether a row was removed
    async fn delete_claim(&mut self, night: NaiveDate, owner: StayId) -> Result<bool, StoreError>;

    /// Loads a stay by id
    async fn find_stay(&mut self, id: StayId) -> Result<Option<Stay>, StoreError>;

    /// Persists a new stay
    async fn insert_stay(&mut self, stay: &Stay) -> Result<(), StoreError>;

    /// Overwrites the guest and date fields of an existing stay
    async fn update_stay(&mut self, stay: &Stay) -> Result<(), StoreError>;

    /// Deletes a stay; returns whether a row was removed
    async fn delete_stay(&mut self, id: StayId) -> Result<bool, StoreError>;

    /// Commits every change made through this transaction
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Row shape shared by both engines
#[derive(sqlx::FromRow)]
pub(crate) struct StayRow {
    id: uuid::Uuid,
    email: String,
    full_name: String,
    check_in_date: NaiveDate,
    check_out_date: NaiveDate,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<StayRow> for Stay {
    fn from(row: StayRow) -> Self {
        Stay {
            id: StayId(row.id),
            email: row.email,
            full_name: row.full_name,
            check_in_date: row.check_in_date,
            check_out_date: row.check_out_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
