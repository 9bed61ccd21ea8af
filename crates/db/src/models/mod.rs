//! Row models.
//!
//! Each struct mirrors one table row (`sqlx::FromRow`). Status columns are
//! stored as TEXT and converted into the core enums when a row is turned
//! into a domain value, so an unknown status surfaces as an integrity error
//! instead of a panic.

pub mod beacon;
pub mod connection;
pub mod kill_switch;
pub mod listing;
pub mod order;
pub mod resale;
pub mod ticket;
pub mod webhook_event;
pub mod xp_ledger;
