use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use super::{BookingStore, StayRow, StoreError, StoreTransaction};
use crate::types::{NightSet, Stay, StayId};

const CREATE_STAYS: &str = r#"
    CREATE TABLE IF NOT EXISTS stays (
        id BLOB PRIMARY KEY NOT NULL,
        email TEXT NOT NULL,
        full_name TEXT NOT NULL,
        check_in_date TEXT NOT NULL,
        check_out_date TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (check_in_date < check_out_date)
    )
"#;

const CREATE_DATE_CLAIMS: &str = r#"
    CREATE TABLE IF NOT EXISTS date_claims (
        claim_date TEXT NOT NULL UNIQUE,
        stay_id BLOB NOT NULL
            REFERENCES stays (id) ON DELETE CASCADE
            DEFERRABLE INITIALLY DEFERRED
    )
"#;

const CREATE_DATE_CLAIMS_STAY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS date_claims_stay_id_idx ON date_claims (stay_id)";

/// Booking store backed by SQLite.
///
/// SQLite admits a single writer at a time. Every transaction opens with
/// `BEGIN IMMEDIATE`, so concurrent bookings queue for the write lock on the
/// busy timeout; the `UNIQUE` constraint on `claim_date` still decides every
/// contested night.
#[derive(Clone)]
pub struct SqliteBookingStore {
    pool: SqlitePool,
}

impl SqliteBookingStore {
    /// Creates a new store over the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `url`.
    ///
    /// In-memory databases live inside one connection, so their pool is
    /// pinned to exactly one connection that is never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        Ok(Self::new(pool))
    }

    /// Fresh private in-memory store with the schema in place
    pub async fn in_memory() -> Result<Self, StoreError> {
        let store = Self::connect("sqlite::memory:", 1).await?;
        store.init_schema().await?;
        Ok(store)
    }

    /// Gives access to the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl BookingStore for SqliteBookingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        // Writers queue on the busy timeout here, never halfway through a transaction
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(Box::new(SqliteStoreTransaction { tx }))
    }

    async fn claimed_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<NightSet, StoreError> {
        let nights = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT claim_date FROM date_claims WHERE claim_date BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(nights.into_iter().collect())
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in [CREATE_STAYS, CREATE_DATE_CLAIMS, CREATE_DATE_CLAIMS_STAY_INDEX] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

struct SqliteStoreTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTransaction for SqliteStoreTransaction {
    async fn insert_claims(&mut self, nights: &NightSet, owner: StayId) -> Result<(), StoreError> {
        if nights.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO date_claims (claim_date, stay_id) ");
        builder.push_values(nights.iter(), |mut row, night| {
            row.push_bind(*night).push_bind(owner.0);
        });
        builder.build().execute(&mut *self.tx).await?;

        Ok(())
    }

    async fn delete_claim(&mut self, night: NaiveDate, owner: StayId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM date_claims WHERE claim_date = $1 AND stay_id = $2")
            .bind(night)
            .bind(owner.0)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_stay(&mut self, id: StayId) -> Result<Option<Stay>, StoreError> {
        let row = sqlx::query_as::<_, StayRow>(
            r#"
            SELECT
                id, email, full_name, check_in_date, check_out_date,
                created_at, updated_at
            FROM stays
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Stay::from))
    }

    async fn insert_stay(&mut self, stay: &Stay) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stays (
                id, email, full_name, check_in_date, check_out_date,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(stay.id.0)
        .bind(&stay.email)
        .bind(&stay.full_name)
        .bind(stay.check_in_date)
        .bind(stay.check_out_date)
        .bind(stay.created_at)
        .bind(stay.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_stay(&mut self, stay: &Stay) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE stays
            SET email = $1,
                full_name = $2,
                check_in_date = $3,
                check_out_date = $4,
                updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&stay.email)
        .bind(&stay.full_name)
        .bind(stay.check_in_date)
        .bind(stay.check_out_date)
        .bind(stay.updated_at)
        .bind(stay.id.0)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_stay(&mut self, id: StayId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM stays WHERE id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, d).unwrap()
    }

    fn stay(check_in: u32, check_out: u32) -> Stay {
        Stay {
            id: StayId::new(),
            email: "guest@example.com".to_string(),
            full_name: "Guest".to_string(),
            check_in_date: date(check_in),
            check_out_date: date(check_out),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stay_round_trips_through_store() {
        let store = SqliteBookingStore::in_memory().await.unwrap();
        let stay = stay(3, 5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_stay(&stay).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let loaded = tx.find_stay(stay.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, stay.id);
        assert_eq!(loaded.check_in_date, date(3));
        assert_eq!(loaded.check_out_date, date(5));
        assert_eq!(loaded.email, "guest@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_claim_is_unique_violation() {
        let store = SqliteBookingStore::in_memory().await.unwrap();
        let first = stay(3, 5);
        let second = stay(4, 6);

        let mut tx = store.begin().await.unwrap();
        tx.insert_stay(&first).await.unwrap();
        tx.insert_claims(&first.nights(), first.id).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_stay(&second).await.unwrap();
        let result = tx.insert_claims(&second.nights(), second.id).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation)));
        drop(tx);

        let claimed = store.claimed_between(date(1), date(10)).await.unwrap();
        assert_eq!(claimed, first.nights());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = SqliteBookingStore::in_memory().await.unwrap();
        let stay = stay(3, 4);

        let mut tx = store.begin().await.unwrap();
        tx.insert_stay(&stay).await.unwrap();
        tx.insert_claims(&stay.nights(), stay.id).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_stay(stay.id).await.unwrap().is_none());
        drop(tx);
        assert!(store.claimed_between(date(1), date(10)).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_read_then_write_transactions_queue_on_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("store.db").display());
        let store = SqliteBookingStore::connect(&url, 4).await.unwrap();
        store.init_schema().await.unwrap();

        let stays: Vec<Stay> = (1..=8).map(|d| stay(d, d + 1)).collect();
        let mut tx = store.begin().await.unwrap();
        for stay in &stays {
            tx.insert_stay(stay).await.unwrap();
            tx.insert_claims(&stay.nights(), stay.id).await.unwrap();
        }
        tx.commit().await.unwrap();
        let ids: Vec<StayId> = stays.iter().map(|stay| stay.id).collect();

        let mut handles = Vec::new();
        for stay in stays {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut tx = store.begin().await?;
                if let Some(mut loaded) = tx.find_stay(stay.id).await? {
                    tokio::task::yield_now().await;
                    loaded.full_name = "Renamed".to_string();
                    tx.update_stay(&loaded).await?;
                }
                tx.commit().await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        for id in ids {
            let loaded = tx.find_stay(id).await.unwrap().unwrap();
            assert_eq!(loaded.full_name, "Renamed");
        }
    }

    #[tokio::test]
    async fn test_deleting_stay_cascades_to_claims() {
        let store = SqliteBookingStore::in_memory().await.unwrap();
        let stay = stay(3, 5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_stay(&stay).await.unwrap();
        tx.insert_claims(&stay.nights(), stay.id).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_stay(stay.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(store.claimed_between(date(1), date(10)).await.unwrap().is_empty());
    }
}
