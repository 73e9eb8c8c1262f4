use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::{BookingStore, StayRow, StoreError, StoreTransaction};
use crate::types::{NightSet, Stay, StayId};

const CREATE_STAYS: &str = r#"
    CREATE TABLE IF NOT EXISTS stays (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL,
        full_name TEXT NOT NULL,
        check_in_date DATE NOT NULL,
        check_out_date DATE NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (check_in_date < check_out_date)
    )
"#;

const CREATE_DATE_CLAIMS: &str = r#"
    CREATE TABLE IF NOT EXISTS date_claims (
        claim_date DATE NOT NULL,
        stay_id UUID NOT NULL,
        CONSTRAINT date_claims_claim_date_key UNIQUE (claim_date),
        CONSTRAINT date_claims_stay_id_fkey FOREIGN KEY (stay_id)
            REFERENCES stays (id) ON DELETE CASCADE
            DEFERRABLE INITIALLY DEFERRED
    )
"#;

const CREATE_DATE_CLAIMS_STAY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS date_claims_stay_id_idx ON date_claims (stay_id)";

/// Booking store backed by a PostgreSQL connection pool.
///
/// Runs at the default READ COMMITTED isolation. Two transactions inserting
/// the same `claim_date` serialize on the unique index: the second blocks
/// until the first commits and then fails with a unique violation.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    /// Creates a new store over the given pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
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

struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn insert_claims(&mut self, nights: &NightSet, owner: StayId) -> Result<(), StoreError> {
        if nights.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> =
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
            FOR UPDATE
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
