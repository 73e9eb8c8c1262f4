//! # Web Handlers for the Campsite Booking Web Application
//!
//! This crate provides the web handlers for the campsite booking API.

/// Booking handlers (availability, create, read, update, cancel)
mod booking_handlers;
pub use booking_handlers::*;

/// Health check handlers
mod health_handlers;
pub use health_handlers::*;
