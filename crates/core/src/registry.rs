//! Beacon type registry.
//!
//! A static catalogue of every interaction a beacon can carry. Lookups are
//! pure; an unknown type string means upstream data is corrupt and is
//! reported as [`CoreError::Internal`].

use serde::Serialize;

use crate::error::CoreError;
use crate::types::Xp;

/// How urgently the client should present a beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Normal,
    High,
}

/// Presentation hints for the scanning client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Accent {
    /// Hex colour used for the scan result card.
    pub color: &'static str,
    pub urgency: Urgency,
}

/// Registry metadata for one beacon type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BeaconTypeMeta {
    pub beacon_type: &'static str,
    pub default_xp: Xp,
    /// Activation requires a non-null target reference.
    pub requires_target: bool,
    /// Only premium owners may activate beacons of this type.
    pub premium_only: bool,
    pub accent: Accent,
}

const fn meta(
    beacon_type: &'static str,
    default_xp: Xp,
    requires_target: bool,
    premium_only: bool,
    color: &'static str,
    urgency: Urgency,
) -> BeaconTypeMeta {
    BeaconTypeMeta {
        beacon_type,
        default_xp,
        requires_target,
        premium_only,
        accent: Accent { color, urgency },
    }
}

/// XP awarded for care access regardless of beacon configuration.
pub const CARE_XP: Xp = 2;

static REGISTRY: &[BeaconTypeMeta] = &[
    meta("presence", 10, false, false, "#22d3ee", Urgency::Normal),
    meta("checkin", 10, false, false, "#22d3ee", Urgency::Normal),
    meta("ticket", 25, true, false, "#a855f7", Urgency::High),
    meta("ticket_resale", 15, true, false, "#a855f7", Urgency::Normal),
    meta("product", 20, true, false, "#f59e0b", Urgency::Normal),
    meta("drop", 30, true, true, "#ef4444", Urgency::High),
    meta("person", 5, false, false, "#ec4899", Urgency::Low),
    meta("room", 5, true, false, "#10b981", Urgency::Normal),
    meta("geo_room", 5, true, false, "#10b981", Urgency::Normal),
    meta("care", CARE_XP, false, false, "#60a5fa", Urgency::Low),
];

/// Look up registry metadata for a beacon type.
pub fn lookup(beacon_type: &str) -> Result<&'static BeaconTypeMeta, CoreError> {
    REGISTRY
        .iter()
        .find(|m| m.beacon_type == beacon_type)
        .ok_or_else(|| CoreError::Internal(format!("beacon type '{beacon_type}' is not registered")))
}

/// Every registered type.
pub fn all() -> &'static [BeaconTypeMeta] {
    REGISTRY
}

/// The interaction a `(type, subtype)` pair routes to.
///
/// Resolution is the single place where type strings meet code; everything
/// downstream matches exhaustively on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconKind {
    Checkin,
    Ticket,
    TicketResale,
    Product,
    PersonConnect,
    Room,
    Care,
}

impl BeaconKind {
    /// Resolve a stored `(type, subtype)` pair, or `None` when the
    /// combination has no handler.
    pub fn resolve(beacon_type: &str, subtype: Option<&str>) -> Option<Self> {
        let kind = match (beacon_type, subtype) {
            ("presence", None | Some("checkin")) | ("checkin", None) => BeaconKind::Checkin,
            ("ticket", None | Some("entry")) => BeaconKind::Ticket,
            ("ticket", Some("resale")) | ("ticket_resale", None) => BeaconKind::TicketResale,
            ("product", None | Some("drop")) | ("drop", None) => BeaconKind::Product,
            ("person", None | Some("connect")) => BeaconKind::PersonConnect,
            ("room", None | Some("geo_room")) | ("geo_room", None) => BeaconKind::Room,
            ("care", _) => BeaconKind::Care,
            _ => return None,
        };
        Some(kind)
    }

    /// Feature name consulted by feature-scoped kill switches.
    pub fn feature(self) -> &'static str {
        match self {
            BeaconKind::Checkin => "checkin",
            BeaconKind::Ticket => "ticketing",
            BeaconKind::TicketResale => "resale",
            BeaconKind::Product => "marketplace",
            BeaconKind::PersonConnect => "social",
            BeaconKind::Room => "rooms",
            BeaconKind::Care => "care",
        }
    }
}
