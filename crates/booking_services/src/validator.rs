use chrono::NaiveDate;
use validator::{Validate, ValidateEmail};

use crate::types::{StayDetails, StayRequest, ValidationError};

/// Limits a stay must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    /// Longest stay in nights
    pub max_nights: i64,
    /// Fewest days between today and check-in
    pub min_days_ahead: i64,
    /// Most days between today and check-in
    pub max_days_ahead: i64,
    /// Longest availability window materialised at once, in days
    pub availability_max_window_days: i64,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            max_nights: 3,
            min_days_ahead: 1,
            max_days_ahead: 30,
            availability_max_window_days: 366,
        }
    }
}

/// Checks a proposed stay against the booking rules.
///
/// Stateless: the same request and `today` always give the same answer.
/// Rules run in a fixed order and the first failure is reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct StayValidator {
    policy: BookingPolicy,
}

impl StayValidator {
    /// Creates a validator enforcing `policy`
    pub fn new(policy: BookingPolicy) -> Self {
        Self { policy }
    }

    /// Validates the final state of a stay and returns its normalised details
    pub fn validate(
        &self,
        stay: &StayRequest,
        today: NaiveDate,
    ) -> Result<StayDetails, ValidationError> {
        let (check_in_date, check_out_date) = match (stay.check_in_date, stay.check_out_date) {
            (Some(check_in), Some(check_out)) => (check_in, check_out),
            _ => return Err(ValidationError::MissingDates),
        };

        if check_in_date >= check_out_date {
            return Err(ValidationError::InvertedRange);
        }

        let nights = (check_out_date - check_in_date).num_days();
        if nights > self.policy.max_nights {
            return Err(ValidationError::StayTooLong {
                max_nights: self.policy.max_nights,
            });
        }

        let days_ahead = (check_in_date - today).num_days();
        if days_ahead < self.policy.min_days_ahead || days_ahead > self.policy.max_days_ahead {
            return Err(ValidationError::BookingWindowViolation {
                min_days_ahead: self.policy.min_days_ahead,
                max_days_ahead: self.policy.max_days_ahead,
            });
        }

        let email = stay.email.as_deref().map(str::trim).unwrap_or_default();
        if email.is_empty() || !email.validate_email() {
            return Err(ValidationError::InvalidEmail);
        }

        let full_name = stay.full_name.as_deref().map(str::trim).unwrap_or_default();
        if full_name.is_empty() {
            return Err(ValidationError::MissingName);
        }

        stay.validate()
            .map_err(|e| ValidationError::Malformed(format!("Validation error: {}", e)))?;

        Ok(StayDetails {
            email: email.to_string(),
            full_name: full_name.to_string(),
            check_in_date,
            check_out_date,
        })
    }
}
