//! Domain records exchanged with the storage ports.

use serde::Serialize;

use crate::geo::GeoClass;
use crate::status::{ConnectionStatus, ListingStatus, OrderStatus, ResaleStatus, TicketStatus};
use crate::types::{DbId, Timestamp, Xp};

// ---------------------------------------------------------------------------
// Ticketing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticket {
    pub id: DbId,
    pub event_id: DbId,
    pub owner_id: DbId,
    pub status: TicketStatus,
    pub issued_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resale {
    pub id: DbId,
    pub ticket_id: DbId,
    pub seller_id: DbId,
    pub price_cents: i64,
    pub currency: String,
    pub status: ResaleStatus,
    pub buyer_id: Option<DbId>,
}

/// Result of an atomic resale completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResaleCompletion {
    pub resale_id: DbId,
    pub seller_id: DbId,
    pub buyer_id: DbId,
    pub old_ticket_id: DbId,
    pub new_ticket_id: DbId,
}

/// Outcome of completing a resale. Only `Completed` writes anything.
#[derive(Debug, Clone, PartialEq)]
pub enum ResaleOutcome {
    Completed(ResaleCompletion),
    /// The resale was already sold or withdrawn.
    NotActive,
    /// The seller's ticket was scanned or transferred since it was listed.
    TicketNotValid,
    /// The payment intent already paid for another purchase.
    PaymentUsed,
}

// ---------------------------------------------------------------------------
// Marketplace / orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub id: DbId,
    pub vendor_id: DbId,
    pub title: String,
    pub price_cents: i64,
    pub currency: String,
    pub stock: i32,
    pub status: ListingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: DbId,
    pub buyer_id: DbId,
    pub seller_id: Option<DbId>,
    pub listing_id: Option<DbId>,
    pub beacon_id: Option<DbId>,
    pub quantity: i32,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub currency: String,
    pub provider_session_id: Option<String>,
    pub provider_intent_id: Option<String>,
    pub stock_released: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Outcome of reserving stock for a purchase.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// One unit was taken and a `created` order now holds it. Replaying the
    /// same intent for the same listing and buyer returns that order again.
    Reserved(Order),
    SoldOut,
    NotActive,
    /// The payment intent already paid for a different purchase.
    PaymentUsed,
}

/// Payment intent as reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIntent {
    pub id: String,
    pub succeeded: bool,
    pub amount_cents: i64,
    pub currency: String,
}

// ---------------------------------------------------------------------------
// Social
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRequest {
    pub id: DbId,
    pub from_user_id: DbId,
    pub to_user_id: DbId,
    pub beacon_id: Option<DbId>,
    pub status: ConnectionStatus,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoomJoin {
    pub room_id: DbId,
    pub newly_joined: bool,
    pub member_count: i64,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: DbId,
    pub user_id: DbId,
    pub amount: Xp,
    pub reason: String,
    pub dedupe_key: String,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub user_id: DbId,
    /// Requested amount before the daily cap is applied.
    pub amount: Xp,
    pub reason: String,
    pub dedupe_key: String,
    pub metadata: serde_json::Value,
}

/// Result of an insert-if-absent ledger write.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerInsert {
    Inserted(LedgerEntry),
    /// An entry with this dedupe key already exists; nothing was written.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct XpTotals {
    pub today: i64,
    pub lifetime: i64,
}

// ---------------------------------------------------------------------------
// Scan events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    Qr,
    Nfc,
    Link,
}

impl ScanSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanSource::Qr => "qr",
            ScanSource::Nfc => "nfc",
            ScanSource::Link => "link",
        }
    }
}

/// Immutable record of one scan attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEvent {
    pub beacon_id: DbId,
    pub user_id: Option<DbId>,
    pub scanned_at: Timestamp,
    pub geo: GeoClass,
    pub action: String,
    pub ok: bool,
    pub xp_awarded: Xp,
    pub source: ScanSource,
    /// Claims of the short-lived signed link, when the scan came through one.
    pub signed_payload: Option<serde_json::Value>,
    /// Degradation noted while serving the scan (ledger timeout etc).
    pub anomaly: Option<String>,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// A best-effort notification handed to the external delivery path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Dot-separated name, e.g. `"connection.requested"`.
    pub kind: String,
    pub recipient_id: Option<DbId>,
    pub source_entity_type: Option<&'static str>,
    pub source_entity_id: Option<DbId>,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            recipient_id: None,
            source_entity_type: None,
            source_entity_id: None,
            payload: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn to(mut self, user_id: DbId) -> Self {
        self.recipient_id = Some(user_id);
        self
    }

    pub fn about(mut self, entity_type: &'static str, id: DbId) -> Self {
        self.source_entity_type = Some(entity_type);
        self.source_entity_id = Some(id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// Payment webhooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Stripe,
    Shopify,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::Shopify => "shopify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stripe" => Some(Provider::Stripe),
            "shopify" => Some(Provider::Shopify),
            _ => None,
        }
    }
}

/// A verified provider event waiting in the webhook inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxEvent {
    pub id: DbId,
    pub provider: Provider,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub received_at: Timestamp,
}
