//! Domain core of the beacon scan service: type registry, geo inference,
//! beacon lifecycle, kill switches, scan routing, the XP ledger and payment
//! reconciliation. No I/O lives here; everything external is reached
//! through the traits in [`ports`].

pub mod beacon;
pub mod error;
pub mod geo;
pub mod kill_switch;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod ports;
pub mod reconciliation;
pub mod registry;
pub mod scan;
pub mod signature;
pub mod signed_link;
pub mod status;
pub mod types;
