use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};

use crate::availability::AvailabilityCalculator;
use crate::clock::Clock;
use crate::ledger::ReservationLedger;
use crate::store::{BookingStore, StoreTransaction};
use crate::types::{BookingError, NightSet, Stay, StayId, StayRequest};
use crate::validator::{BookingPolicy, StayValidator};

/// Orchestrates create, update and cancel of stays.
///
/// Each operation runs in exactly one store transaction. Any failure drops
/// the transaction before commit, so the store is left exactly as it was.
/// Conflicts are business outcomes and are never retried here.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    validator: StayValidator,
    max_window_days: i64,
}

impl BookingService {
    /// Creates a new service over `store`, reading dates from `clock`
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, policy: BookingPolicy) -> Self {
        Self {
            store,
            clock,
            validator: StayValidator::new(policy),
            max_window_days: policy.availability_max_window_days,
        }
    }

    /// Unclaimed dates in `[start, end]`; see [`AvailabilityCalculator`]
    pub async fn available_dates(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<NightSet, BookingError> {
        let today = self.clock.today();
        let dates = AvailabilityCalculator::new(self.max_window_days)
            .available_dates(self.store.as_ref(), start, end, today)
            .await?;
        Ok(dates)
    }

    /// Books a new stay and returns it with its assigned id
    pub async fn create(&self, request: &StayRequest) -> Result<Stay, BookingError> {
        let today = self.clock.today();
        let details = self.validator.validate(request, today)?;
        let stay = Stay::from_details(StayId::new(), details, Self::now());

        let mut tx = self.store.begin().await?;

        if let Err(e) = ReservationLedger::try_claim(tx.as_mut(), &stay.nights(), stay.id).await {
            log::warn!(
                "Booking {}..{} rejected: {}",
                stay.check_in_date,
                stay.check_out_date,
                e
            );
            return Err(e.into());
        }

        tx.insert_stay(&stay).await?;
        tx.commit().await?;

        log::info!(
            "Created stay {} for {} ({}..{})",
            stay.id,
            stay.email,
            stay.check_in_date,
            stay.check_out_date
        );
        Ok(stay)
    }

    /// Loads a stay by id
    pub async fn find(&self, id: StayId) -> Result<Stay, BookingError> {
        let mut tx = self.store.begin().await?;
        let stay = tx.find_stay(id).await?.ok_or(BookingError::NotFound)?;
        Ok(stay)
    }

    /// Applies a partial update to a stay.
    ///
    /// Only the nights that differ between the stored and the merged range
    /// are released or claimed; nights in both ranges are left untouched.
    pub async fn update(&self, id: StayId, partial: &StayRequest) -> Result<Stay, BookingError> {
        let today = self.clock.today();
        let mut tx = self.store.begin().await?;
        let mut stay = Self::load_active(tx.as_mut(), id, today).await?;

        let details = self.validator.validate(&partial.merged_onto(&stay), today)?;

        let old_nights = stay.nights();
        let new_nights = details.nights();
        let to_release: NightSet = old_nights.difference(&new_nights).copied().collect();
        let to_claim: NightSet = new_nights.difference(&old_nights).copied().collect();

        log::debug!(
            "Stay {}: releasing {:?}, claiming {:?}",
            id,
            to_release,
            to_claim
        );

        if let Err(e) = ReservationLedger::release(tx.as_mut(), &to_release, id).await {
            log::error!("Stay {} does not own its nights: {}", id, e);
            return Err(e.into());
        }
        if let Err(e) = ReservationLedger::try_claim(tx.as_mut(), &to_claim, id).await {
            log::warn!("Update of stay {} rejected: {}", id, e);
            return Err(e.into());
        }

        stay.apply(details, Self::now());
        tx.update_stay(&stay).await?;
        tx.commit().await?;

        log::info!(
            "Updated stay {} ({}..{})",
            stay.id,
            stay.check_in_date,
            stay.check_out_date
        );
        Ok(stay)
    }

    /// Cancels a stay and frees its nights
    pub async fn cancel(&self, id: StayId) -> Result<(), BookingError> {
        let today = self.clock.today();
        let mut tx = self.store.begin().await?;
        let stay = Self::load_active(tx.as_mut(), id, today).await?;

        if let Err(e) = ReservationLedger::release(tx.as_mut(), &stay.nights(), id).await {
            log::error!("Stay {} does not own its nights: {}", id, e);
            return Err(e.into());
        }
        tx.delete_stay(id).await?;
        tx.commit().await?;

        log::info!("Cancelled stay {}", id);
        Ok(())
    }

    // Timestamps are kept at the microsecond precision both engines store
    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    async fn load_active(
        tx: &mut dyn StoreTransaction,
        id: StayId,
        today: NaiveDate,
    ) -> Result<Stay, BookingError> {
        let stay = tx.find_stay(id).await?.ok_or(BookingError::NotFound)?;
        if stay.is_finished(today) {
            return Err(BookingError::AlreadyFinished);
        }
        Ok(stay)
    }
}
