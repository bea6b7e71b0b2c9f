//! PAYDESK: client core of the exchange dashboard
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod fees;
pub mod identity;
pub mod gateway;
pub mod sync;
pub mod tickets;
pub mod account;
