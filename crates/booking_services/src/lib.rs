//! # Booking Services
//!
//! This crate provides the reservation engine for the campsite.
//! It validates stays, keeps the date-level claim ledger, computes
//! availability and coordinates create, update and cancel operations.

/// Advisory availability lookups over the ledger.
pub mod availability;
/// Sources of the current calendar date.
pub mod clock;
/// The date claim ledger and its claim/release primitives.
pub mod ledger;
/// Transactional create, update and cancel of stays.
pub mod service;
/// Storage engines backing stays and date claims.
pub mod store;
/// Types and errors shared by the booking services.
pub mod types;
/// Booking rules a stay must satisfy.
pub mod validator;

pub use availability::AvailabilityCalculator;
pub use clock::{Clock, FixedClock, SystemClock};
pub use ledger::ReservationLedger;
pub use service::BookingService;
pub use store::{BookingStore, PgBookingStore, SqliteBookingStore, StoreError, StoreTransaction};
pub use types::*;
pub use validator::{BookingPolicy, StayValidator};
