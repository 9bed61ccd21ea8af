//! Beacon entity, lifecycle transitions and scan availability.

use serde::Serialize;

use crate::error::CoreError;
use crate::geo::Geofence;
use crate::registry::{self, BeaconKind};
use crate::status::BeaconStatus;
use crate::types::{DbId, Timestamp, Xp};

/// A scannable unit bound to a real-world interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub id: DbId,
    /// Human-facing code printed on the QR / written to the NFC tag.
    pub code: String,
    pub beacon_type: String,
    pub subtype: Option<String>,
    pub label: String,
    pub status: BeaconStatus,
    pub owner_id: DbId,
    /// Event, listing, resale, or room the beacon acts on.
    pub target_ref: Option<DbId>,
    pub vendor_id: Option<DbId>,
    pub city: Option<String>,
    pub xp_base: Option<Xp>,
    pub xp_multiplier: Option<f64>,
    pub scan_count: i64,
    pub scan_limit: Option<i64>,
    pub per_user_daily_limit: Option<i32>,
    pub geofence: Option<Geofence>,
    pub active_from: Option<Timestamp>,
    pub active_until: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Beacon {
    pub fn kind(&self) -> Option<BeaconKind> {
        BeaconKind::resolve(&self.beacon_type, self.subtype.as_deref())
    }

    /// XP for a qualifying interaction: the beacon's own base (or the
    /// registry default) scaled by the optional bonus multiplier.
    pub fn xp_amount(&self, default_xp: Xp) -> Xp {
        let base = self.xp_base.unwrap_or(default_xp).max(0);
        match self.xp_multiplier {
            Some(m) if m.is_finite() && m > 0.0 => (f64::from(base) * m).round() as Xp,
            _ => base,
        }
    }

    /// Public summary embedded in scan responses.
    pub fn summary(&self) -> BeaconSummary {
        BeaconSummary {
            id: self.id,
            code: self.code.clone(),
            beacon_type: self.beacon_type.clone(),
            subtype: self.subtype.clone(),
            label: self.label.clone(),
            status: self.status,
        }
    }

    /// Decide whether the beacon can be scanned at `now`.
    ///
    /// Scheduled expiry is reported even if the background sweep has not yet
    /// flipped the stored status.
    pub fn availability(&self, now: Timestamp) -> Result<(), Unavailable> {
        match self.status {
            BeaconStatus::Active => {}
            BeaconStatus::Draft => return Err(Unavailable::NotActive),
            BeaconStatus::Paused => return Err(Unavailable::Paused),
            BeaconStatus::Expired => return Err(Unavailable::Expired),
            BeaconStatus::Archived => return Err(Unavailable::Archived),
        }
        if self.active_from.is_some_and(|from| now < from) {
            return Err(Unavailable::NotYetActive);
        }
        if self.active_until.is_some_and(|until| now >= until) {
            return Err(Unavailable::Expired);
        }
        if self.scan_limit.is_some_and(|limit| self.scan_count >= limit) {
            return Err(Unavailable::ScanLimitReached);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconSummary {
    pub id: DbId,
    pub code: String,
    #[serde(rename = "type")]
    pub beacon_type: String,
    pub subtype: Option<String>,
    pub label: String,
    pub status: BeaconStatus,
}

/// Why a beacon cannot be scanned right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    NotActive,
    NotYetActive,
    Paused,
    Expired,
    Archived,
    ScanLimitReached,
    DailyLimitReached,
    LinkExpired,
    LinkInvalid,
}

/// Check a requested status change against the lifecycle graph.
///
/// ```text
/// draft ──► active ◄──► paused
///             │            │
///             ▼            ▼
///          expired ◄───────┘
/// (any non-archived) ──► archived
/// ```
pub fn validate_transition(from: BeaconStatus, to: BeaconStatus) -> Result<(), CoreError> {
    use BeaconStatus::*;
    let allowed = matches!(
        (from, to),
        (Draft, Active)
            | (Active, Paused)
            | (Paused, Active)
            | (Active, Expired)
            | (Paused, Expired)
            | (Draft | Active | Paused | Expired, Archived)
    );
    if allowed {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "beacon cannot move from '{from}' to '{to}'"
        )))
    }
}

/// Validate the invariants that must hold before a beacon goes live.
pub fn validate_activation(beacon: &Beacon, owner_is_premium: bool) -> Result<(), CoreError> {
    let meta = registry::lookup(&beacon.beacon_type)?;
    if meta.requires_target && beacon.target_ref.is_none() {
        return Err(CoreError::Validation(format!(
            "beacon type '{}' requires a target before activation",
            beacon.beacon_type
        )));
    }
    if meta.premium_only && !owner_is_premium {
        return Err(CoreError::Forbidden(format!(
            "beacon type '{}' is limited to premium owners",
            beacon.beacon_type
        )));
    }
    if let Some(fence) = &beacon.geofence {
        fence.validate().map_err(CoreError::Validation)?;
    }
    if let (Some(from), Some(until)) = (beacon.active_from, beacon.active_until) {
        if until <= from {
            return Err(CoreError::Validation(
                "active_until must be later than active_from".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;

    use super::*;

    pub fn beacon(id: DbId, beacon_type: &str, subtype: Option<&str>) -> Beacon {
        Beacon {
            id,
            code: format!("B{id:04}"),
            beacon_type: beacon_type.into(),
            subtype: subtype.map(Into::into),
            label: format!("{beacon_type} beacon"),
            status: BeaconStatus::Active,
            owner_id: 900,
            target_ref: None,
            vendor_id: None,
            city: None,
            xp_base: None,
            xp_multiplier: None,
            scan_count: 0,
            scan_limit: None,
            per_user_daily_limit: None,
            geofence: None,
            active_from: None,
            active_until: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::fixtures::beacon;
    use super::*;

    #[test]
    fn xp_amount_prefers_beacon_base_and_applies_multiplier() {
        let mut b = beacon(1, "checkin", None);
        assert_eq!(b.xp_amount(10), 10);
        b.xp_base = Some(12);
        assert_eq!(b.xp_amount(10), 12);
        b.xp_multiplier = Some(1.5);
        assert_eq!(b.xp_amount(10), 18);
        b.xp_multiplier = Some(f64::NAN);
        assert_eq!(b.xp_amount(10), 12);
    }

    #[test]
    fn availability_checks_status_window_and_limit() {
        let now = Utc::now();
        let mut b = beacon(1, "checkin", None);
        assert_eq!(b.availability(now), Ok(()));

        b.status = BeaconStatus::Paused;
        assert_eq!(b.availability(now), Err(Unavailable::Paused));
        b.status = BeaconStatus::Active;

        b.active_from = Some(now + Duration::hours(1));
        assert_eq!(b.availability(now), Err(Unavailable::NotYetActive));
        b.active_from = None;

        b.active_until = Some(now - Duration::seconds(1));
        assert_eq!(b.availability(now), Err(Unavailable::Expired));
        b.active_until = None;

        b.scan_limit = Some(3);
        b.scan_count = 3;
        assert_eq!(b.availability(now), Err(Unavailable::ScanLimitReached));
    }

    #[test]
    fn lifecycle_graph() {
        use BeaconStatus::*;
        assert!(validate_transition(Draft, Active).is_ok());
        assert!(validate_transition(Active, Paused).is_ok());
        assert!(validate_transition(Paused, Active).is_ok());
        assert!(validate_transition(Expired, Archived).is_ok());
        assert!(validate_transition(Archived, Active).is_err());
        assert!(validate_transition(Expired, Active).is_err());
        assert!(validate_transition(Draft, Paused).is_err());
    }

    #[test]
    fn activation_requires_target_when_registry_says_so() {
        let mut b = beacon(1, "ticket", None);
        b.status = BeaconStatus::Draft;
        assert!(matches!(validate_activation(&b, false), Err(CoreError::Validation(_))));
        b.target_ref = Some(77);
        assert!(validate_activation(&b, false).is_ok());
    }

    #[test]
    fn activation_enforces_premium_gate() {
        let mut b = beacon(1, "drop", None);
        b.target_ref = Some(5);
        assert!(matches!(validate_activation(&b, false), Err(CoreError::Forbidden(_))));
        assert!(validate_activation(&b, true).is_ok());
    }

    #[test]
    fn activation_rejects_inverted_window() {
        let now = Utc::now();
        let mut b = beacon(1, "care", None);
        b.active_from = Some(now);
        b.active_until = Some(now - Duration::minutes(5));
        assert!(validate_activation(&b, false).is_err());
    }
}
