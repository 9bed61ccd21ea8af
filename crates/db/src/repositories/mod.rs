//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument. Methods that must be atomic
//! either issue one conditional statement or open their own transaction.
//! [`PaymentClaimRepo`] is the exception: it only ever runs inside another
//! repository's transaction and takes the connection instead.

pub mod beacon_repo;
pub mod connection_repo;
pub mod kill_switch_repo;
pub mod listing_repo;
pub mod order_repo;
pub mod payment_claim_repo;
pub mod platform_event_repo;
pub mod resale_repo;
pub mod room_repo;
pub mod scan_event_repo;
pub mod ticket_repo;
pub mod webhook_event_repo;
pub mod xp_ledger_repo;

pub use beacon_repo::BeaconRepo;
pub use connection_repo::ConnectionRepo;
pub use kill_switch_repo::KillSwitchRepo;
pub use listing_repo::{ListingRepo, ReserveOutcome};
pub use order_repo::OrderRepo;
pub use payment_claim_repo::{ClaimPurpose, PaymentClaimRepo};
pub use platform_event_repo::PlatformEventRepo;
pub use resale_repo::{CompleteOutcome, CompletedResale, ResaleRepo};
pub use room_repo::RoomRepo;
pub use scan_event_repo::ScanEventRepo;
pub use ticket_repo::TicketRepo;
pub use webhook_event_repo::WebhookEventRepo;
pub use xp_ledger_repo::XpLedgerRepo;
