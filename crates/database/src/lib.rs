//! # Database
//!
//! This crate connects the campsite booking server to its database.
//! It selects the storage engine from the connection URL and prepares the schema.

/// Database connection and schema setup utilities.
pub mod database;
