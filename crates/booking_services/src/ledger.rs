use chrono::NaiveDate;

use crate::store::{BookingStore, StoreError, StoreTransaction};
use crate::types::{LedgerError, NightSet, StayId};

/// Date-level allocation table: at most one live claim per calendar date.
///
/// Mutations run inside the caller's transaction so that they commit or
/// roll back together with the stay they belong to. Contention is settled
/// by the store's uniqueness constraint, never by a lock held here.
pub struct ReservationLedger;

impl ReservationLedger {
    /// Claims every night in `nights` for `owner`, or none of them.
    ///
    /// A night already claimed by anyone, `owner` included, yields
    /// [`LedgerError::Conflict`], as does losing a deadlock against another
    /// claimant. The insert is a single statement, so a conflict leaves no
    /// partial claims behind.
    pub async fn try_claim(
        tx: &mut dyn StoreTransaction,
        nights: &NightSet,
        owner: StayId,
    ) -> Result<(), LedgerError> {
        if nights.is_empty() {
            return Ok(());
        }

        match tx.insert_claims(nights, owner).await {
            Ok(()) => {
                log::debug!("Stay {} claimed {} night(s)", owner, nights.len());
                Ok(())
            }
            Err(StoreError::UniqueViolation | StoreError::Contention) => Err(LedgerError::Conflict),
            Err(e) => Err(LedgerError::Store(e)),
        }
    }

    /// Releases the claims `owner` holds on `nights`.
    ///
    /// Fails with [`LedgerError::NotFound`] on the first night that is not
    /// claimed by `owner`; the caller is expected to roll back.
    pub async fn release(
        tx: &mut dyn StoreTransaction,
        nights: &NightSet,
        owner: StayId,
    ) -> Result<(), LedgerError> {
        for night in nights {
            if !tx.delete_claim(*night, owner).await? {
                return Err(LedgerError::NotFound(*night));
            }
        }

        if !nights.is_empty() {
            log::debug!("Stay {} released {} night(s)", owner, nights.len());
        }
        Ok(())
    }

    /// Claimed dates in the closed window `[start, end]`.
    ///
    /// Reads committed state only and holds nothing afterwards: a night
    /// missing here may be claimed by the time the caller acts on it.
    pub async fn claimed_within(
        store: &dyn BookingStore,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<NightSet, LedgerError> {
        if end < start {
            return Ok(NightSet::new());
        }
        Ok(store.claimed_between(start, end).await?)
    }
}
