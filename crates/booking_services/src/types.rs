use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::store::StoreError;

/// A set of calendar nights, kept in date order
pub type NightSet = BTreeSet<NaiveDate>;

/// Opaque identifier of a stay, assigned on creation and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StayId(pub Uuid);

impl StayId {
    /// Generates a fresh random stay identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Request structure for creating or updating a stay.
///
/// Every field is optional at this level: a create request with a missing
/// field is rejected by the validator, while an update request only
/// overwrites the fields it carries.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StayRequest {
    /// Email address of the guest
    #[validate(length(max = 255, message = "Email must be at most 255 characters"))]
    pub email: Option<String>,

    /// Full name of the guest
    #[validate(length(max = 255, message = "Full name must be at most 255 characters"))]
    pub full_name: Option<String>,

    /// First night of the stay
    pub check_in_date: Option<NaiveDate>,

    /// Departure date, the stay does not occupy this night
    pub check_out_date: Option<NaiveDate>,
}

impl StayRequest {
    /// Overlays this partial request on a persisted stay. Unset fields keep
    /// the stay's current values.
    pub fn merged_onto(&self, stay: &Stay) -> StayRequest {
        StayRequest {
            email: Some(self.email.clone().unwrap_or_else(|| stay.email.clone())),
            full_name: Some(
                self.full_name
                    .clone()
                    .unwrap_or_else(|| stay.full_name.clone()),
            ),
            check_in_date: Some(self.check_in_date.unwrap_or(stay.check_in_date)),
            check_out_date: Some(self.check_out_date.unwrap_or(stay.check_out_date)),
        }
    }
}

/// Stay details that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StayDetails {
    /// Email address of the guest, trimmed
    pub email: String,
    /// Full name of the guest, trimmed
    pub full_name: String,
    /// First night of the stay
    pub check_in_date: NaiveDate,
    /// Departure date (exclusive)
    pub check_out_date: NaiveDate,
}

impl StayDetails {
    /// Nights occupied by these details
    pub fn nights(&self) -> NightSet {
        nights_between(self.check_in_date, self.check_out_date)
    }
}

/// A confirmed reservation as persisted by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stay {
    /// Unique identifier for the stay
    pub id: StayId,
    /// Email address of the guest
    pub email: String,
    /// Full name of the guest
    pub full_name: String,
    /// First night of the stay
    pub check_in_date: NaiveDate,
    /// Departure date (exclusive)
    pub check_out_date: NaiveDate,
    /// When the stay was created
    pub created_at: DateTime<Utc>,
    /// When the stay was last updated
    pub updated_at: DateTime<Utc>,
}

impl Stay {
    /// Builds a new, not yet persisted stay from validated details
    pub fn from_details(id: StayId, details: StayDetails, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email: details.email,
            full_name: details.full_name,
            check_in_date: details.check_in_date,
            check_out_date: details.check_out_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the guest and date fields with validated details
    pub fn apply(&mut self, details: StayDetails, now: DateTime<Utc>) {
        self.email = details.email;
        self.full_name = details.full_name;
        self.check_in_date = details.check_in_date;
        self.check_out_date = details.check_out_date;
        self.updated_at = now;
    }

    /// Every night in `[check_in_date, check_out_date)`
    pub fn nights(&self) -> NightSet {
        nights_between(self.check_in_date, self.check_out_date)
    }

    /// A stay whose departure date lies before `today` can no longer change
    pub fn is_finished(&self, today: NaiveDate) -> bool {
        self.check_out_date < today
    }
}

/// Returns the nights of the half-open range `[check_in, check_out)`
pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> NightSet {
    check_in
        .iter_days()
        .take_while(|night| *night < check_out)
        .collect()
}

/// Response structure describing a stay
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StayResponse {
    /// Unique identifier for the stay
    pub id: StayId,
    /// Email address of the guest
    pub email: String,
    /// Full name of the guest
    pub full_name: String,
    /// First night of the stay
    pub check_in_date: NaiveDate,
    /// Departure date
    pub check_out_date: NaiveDate,
    /// Number of nights occupied
    pub nights: i64,
}

impl From<&Stay> for StayResponse {
    fn from(stay: &Stay) -> Self {
        Self {
            id: stay.id,
            email: stay.email.clone(),
            full_name: stay.full_name.clone(),
            check_in_date: stay.check_in_date,
            check_out_date: stay.check_out_date,
            nights: (stay.check_out_date - stay.check_in_date).num_days(),
        }
    }
}

/// Query parameters for the availability lookup
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    /// First date of the window, defaults to today
    pub start_date: Option<NaiveDate>,
    /// Last date of the window (inclusive), defaults to one month from today
    pub end_date: Option<NaiveDate>,
}

/// Reasons a stay is rejected before the ledger is touched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Check-in or check-out date is missing
    #[error("Booking dates are required.")]
    MissingDates,

    /// Check-in is not strictly before check-out
    #[error("Check-in date should be before check-out date.")]
    InvertedRange,

    /// Stay is longer than the policy allows
    #[error("The campsite can be reserved for max {max_nights} nights.")]
    StayTooLong {
        /// Longest allowed stay
        max_nights: i64,
    },

    /// Check-in is too close or too far from today
    #[error(
        "The campsite can be reserved minimum {min_days_ahead} day(s) ahead of arrival and up to {max_days_ahead} days in advance."
    )]
    BookingWindowViolation {
        /// Smallest allowed lead time in days
        min_days_ahead: i64,
        /// Largest allowed lead time in days
        max_days_ahead: i64,
    },

    /// Email is blank or malformed
    #[error("A valid e-mail is required to complete the reservation.")]
    InvalidEmail,

    /// Full name is blank
    #[error("The full name is required to complete the reservation.")]
    MissingName,

    /// Request failed field-level checks (lengths)
    #[error("{0}")]
    Malformed(String),
}

impl ValidationError {
    /// Machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MissingDates => "missing_dates",
            ValidationError::InvertedRange => "inverted_range",
            ValidationError::StayTooLong { .. } => "stay_too_long",
            ValidationError::BookingWindowViolation { .. } => "booking_window_violation",
            ValidationError::InvalidEmail => "invalid_email",
            ValidationError::MissingName => "missing_name",
            ValidationError::Malformed(_) => "malformed_request",
        }
    }
}

/// Failures reported by the reservation ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// At least one requested night is already claimed
    #[error("One or more requested nights are already claimed")]
    Conflict,

    /// A night to release is not claimed by the given stay
    #[error("No claim on {0} held by this stay")]
    NotFound(NaiveDate),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcomes of booking operations that did not succeed
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// The stay breaks a booking rule
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Another stay holds one of the requested nights
    #[error("The requested dates are no longer available")]
    Unavailable,

    /// No stay with the given id
    #[error("Booking not found")]
    NotFound,

    /// The stay already ended and can no longer change
    #[error("Booking already finished")]
    AlreadyFinished,

    /// A stay's own claim was missing while releasing it
    #[error("Ledger is inconsistent: claim on {0} is missing")]
    LedgerInconsistent(NaiveDate),

    /// Unrecoverable storage failure
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            // The engine picked this transaction as the loser of a race for nights
            StoreError::Contention => BookingError::Unavailable,
            other => BookingError::Storage(other),
        }
    }
}

impl From<LedgerError> for BookingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Conflict => BookingError::Unavailable,
            LedgerError::NotFound(night) => BookingError::LedgerInconsistent(night),
            LedgerError::Store(e) => BookingError::from(e),
        }
    }
}

impl BookingError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation_error",
            BookingError::Unavailable => "unavailable",
            BookingError::NotFound => "booking_not_found",
            BookingError::AlreadyFinished => "already_finished",
            BookingError::LedgerInconsistent(_) | BookingError::Storage(_) => "internal_error",
        }
    }
}

impl actix_web::ResponseError for BookingError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::Unavailable => StatusCode::CONFLICT,
            BookingError::NotFound => StatusCode::NOT_FOUND,
            BookingError::AlreadyFinished => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            BookingError::Validation(reason) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": self.kind(),
                "reason": reason.reason(),
                "message": reason.to_string()
            })),
            BookingError::Unavailable => HttpResponse::Conflict().json(serde_json::json!({
                "error": self.kind(),
                "message": "One or more of the requested dates are already booked"
            })),
            BookingError::NotFound => HttpResponse::NotFound().json(serde_json::json!({
                "error": self.kind(),
                "message": "Booking not found"
            })),
            BookingError::AlreadyFinished => HttpResponse::Gone().json(serde_json::json!({
                "error": self.kind(),
                "message": "The booking has already finished and can no longer be changed"
            })),
            _ => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": self.kind(),
                "message": "An internal error occurred"
            })),
        }
    }
}
