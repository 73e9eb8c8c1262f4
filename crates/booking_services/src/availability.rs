use chrono::{Days, Months, NaiveDate};

use crate::ledger::ReservationLedger;
use crate::store::BookingStore;
use crate::types::{LedgerError, NightSet};

/// Computes which dates in a window nobody has claimed.
///
/// The answer is advisory. It is read outside any transaction and only a
/// successful claim actually reserves a date.
pub struct AvailabilityCalculator {
    max_window_days: u64,
}

impl AvailabilityCalculator {
    /// Creates a calculator that materialises at most `max_window_days` dates per call
    pub fn new(max_window_days: i64) -> Self {
        Self {
            max_window_days: u64::try_from(max_window_days).unwrap_or(0),
        }
    }

    /// Resolves the effective `[start, end]` window, both ends inclusive.
    ///
    /// `start` defaults to today and is never earlier than today; `end`
    /// defaults to one month from today.
    pub fn window(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> (NaiveDate, NaiveDate) {
        let start = start.map_or(today, |start| start.max(today));
        let end = end.unwrap_or_else(|| {
            today
                .checked_add_months(Months::new(1))
                .unwrap_or(NaiveDate::MAX)
        });

        // Cap the window so a far-off end date cannot blow up the candidate set
        let last_allowed = self
            .max_window_days
            .checked_sub(1)
            .and_then(|span| start.checked_add_days(Days::new(span)));
        let end = match last_allowed {
            Some(last) => end.min(last),
            None => end,
        };

        (start, end)
    }

    /// Dates in the window that hold no claim
    pub async fn available_dates(
        &self,
        store: &dyn BookingStore,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<NightSet, LedgerError> {
        let (start, end) = self.window(start, end, today);
        if end < start || self.max_window_days == 0 {
            return Ok(NightSet::new());
        }

        let claimed = ReservationLedger::claimed_within(store, start, end).await?;
        let available = start
            .iter_days()
            .take_while(|date| *date <= end)
            .filter(|date| !claimed.contains(date))
            .collect();

        Ok(available)
    }
}
