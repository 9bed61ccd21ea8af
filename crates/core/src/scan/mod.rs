//! Scan routing.
//!
//! A scan flows through [`engine::ScanEngine`]: beacon lookup, signed-link
//! check, kill switches, availability, registry, geo inference, the
//! per-kind handler in [`handlers`], scan counting, the XP ledger and the
//! scan event log. Whatever happens, the caller gets a [`ScanResponse`].

pub mod engine;
pub mod handlers;

use serde::{Deserialize, Serialize};

use crate::beacon::{BeaconSummary, Unavailable};
use crate::geo::{GeoClass, GeoPoint};
use crate::kill_switch::KillSwitchScope;
use crate::models::ScanSource;
use crate::status::{ConnectionStatus, ResaleStatus, TicketStatus};
use crate::types::{DbId, Timestamp, Xp};

pub use engine::ScanEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Side-effect-free look at the target.
    #[default]
    View,
    /// Ticket entry validation.
    Validate,
    /// Resale or product purchase.
    Purchase,
}

/// `exp` / `sig` query parameters of a signed link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParams {
    pub expires_at: i64,
    pub sig: String,
}

/// One incoming scan, already authenticated by the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub code: String,
    pub user_id: Option<DbId>,
    pub mode: ScanMode,
    pub source: ScanSource,
    pub point: Option<GeoPoint>,
    pub ticket_id: Option<DbId>,
    pub payment_intent_id: Option<String>,
    pub link: Option<LinkParams>,
    pub scanned_at: Timestamp,
}

impl ScanRequest {
    pub fn new(code: impl Into<String>, user_id: Option<DbId>, scanned_at: Timestamp) -> Self {
        Self {
            code: code.into(),
            user_id,
            mode: ScanMode::View,
            source: ScanSource::Qr,
            point: None,
            ticket_id: None,
            payment_intent_id: None,
            link: None,
            scanned_at,
        }
    }
}

/// Structured UI payload. Every outcome, including failures, is one of these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanUi {
    Checkin {
        inside_venue: bool,
        geo: GeoClass,
    },
    TicketView {
        ticket_id: DbId,
        event_id: DbId,
        status: TicketStatus,
    },
    TicketValidated {
        ticket_id: DbId,
        event_id: DbId,
    },
    /// `status` is the ticket status, or `"wrong_event"`.
    TicketInvalid {
        ticket_id: DbId,
        status: String,
    },
    ResaleView {
        resale_id: DbId,
        ticket_id: DbId,
        price_cents: i64,
        currency: String,
        status: ResaleStatus,
    },
    ResaleUnavailable {
        resale_id: DbId,
        reason: &'static str,
    },
    ResaleCompleted {
        resale_id: DbId,
        ticket_id: DbId,
    },
    ProductView {
        listing_id: DbId,
        title: String,
        price_cents: i64,
        currency: String,
        stock: i32,
        sold_out: bool,
    },
    SoldOut {
        listing_id: DbId,
    },
    ListingClosed {
        listing_id: DbId,
    },
    PurchaseReserved {
        listing_id: DbId,
        order_id: DbId,
    },
    PaymentRequired {
        reason: &'static str,
    },
    ConnectOwnerView {
        pending_requests: i64,
    },
    ConnectRequested {
        request_id: DbId,
        to_user_id: DbId,
        status: ConnectionStatus,
        already_requested: bool,
    },
    RoomJoined {
        room_id: DbId,
        member_count: i64,
        newly_joined: bool,
    },
    Care {
        message: &'static str,
    },
    AuthRequired {
        reason: &'static str,
    },
    NotFound {
        entity: &'static str,
    },
    Unavailable {
        reason: Unavailable,
    },
    Blocked {
        scope: KillSwitchScope,
        reason: String,
    },
    Unsupported {
        beacon_type: String,
        subtype: Option<String>,
    },
    /// The datastore could not confirm an operation that must not be
    /// approximated.
    RetryLater {
        reason: &'static str,
    },
}

/// Wire shape returned to scanning clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResponse {
    pub ok: bool,
    pub action: &'static str,
    pub beacon: Option<BeaconSummary>,
    pub xp_awarded: Xp,
    pub ui: ScanUi,
}

impl ScanResponse {
    /// True when the code did not resolve to any beacon.
    pub fn is_beacon_missing(&self) -> bool {
        self.beacon.is_none() && matches!(self.ui, ScanUi::NotFound { entity: "beacon" })
    }
}

/// Action labels reported in responses and scan events.
pub mod actions {
    pub const CHECKIN: &str = "checkin";
    pub const TICKET_VIEW: &str = "ticket_view";
    pub const TICKET_VALIDATE: &str = "ticket_validate";
    pub const RESALE_VIEW: &str = "resale_view";
    pub const RESALE_PURCHASE: &str = "resale_purchase";
    pub const PRODUCT_VIEW: &str = "product_view";
    pub const PRODUCT_PURCHASE: &str = "product_purchase";
    pub const CONNECT_REQUEST: &str = "connect_request";
    pub const CONNECT_OWNER_VIEW: &str = "connect_owner_view";
    pub const ROOM_JOIN: &str = "room_join";
    pub const CARE_ACCESS: &str = "care_access";
    pub const NOT_FOUND: &str = "not_found";
    pub const BLOCKED: &str = "blocked";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const UNSUPPORTED: &str = "unsupported";
    pub const ERROR: &str = "error";
}
