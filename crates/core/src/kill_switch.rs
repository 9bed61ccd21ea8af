//! Administrative kill switches.
//!
//! A switch disables scanning within a scope. When several active switches
//! match a scan, the most specific one is reported:
//! beacon > vendor > feature > city > global.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KillSwitchScope {
    Global,
    City,
    Feature,
    Vendor,
    Beacon,
}

impl KillSwitchScope {
    /// Higher wins. Derived `Ord` follows declaration order, so this is the
    /// same ranking spelled out for readers of the wire format.
    pub fn precedence(self) -> u8 {
        match self {
            KillSwitchScope::Global => 0,
            KillSwitchScope::City => 1,
            KillSwitchScope::Feature => 2,
            KillSwitchScope::Vendor => 3,
            KillSwitchScope::Beacon => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KillSwitchScope::Global => "global",
            KillSwitchScope::City => "city",
            KillSwitchScope::Feature => "feature",
            KillSwitchScope::Vendor => "vendor",
            KillSwitchScope::Beacon => "beacon",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(KillSwitchScope::Global),
            "city" => Some(KillSwitchScope::City),
            "feature" => Some(KillSwitchScope::Feature),
            "vendor" => Some(KillSwitchScope::Vendor),
            "beacon" => Some(KillSwitchScope::Beacon),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KillSwitch {
    pub id: DbId,
    pub scope: KillSwitchScope,
    /// Scope value: city name, feature name, vendor id or beacon id.
    /// `None` only for `global`.
    pub target: Option<String>,
    pub reason: String,
    pub is_active: bool,
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

impl KillSwitch {
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.is_active && self.expires_at.map_or(true, |at| now < at)
    }

    fn matches(&self, target: &ScanTarget<'_>) -> bool {
        let want = self.target.as_deref();
        match self.scope {
            KillSwitchScope::Global => true,
            KillSwitchScope::City => match (want, target.city) {
                (Some(w), Some(city)) => w.eq_ignore_ascii_case(city),
                _ => false,
            },
            KillSwitchScope::Feature => want == Some(target.feature),
            KillSwitchScope::Vendor => match (want, target.vendor_id) {
                (Some(w), Some(v)) => w == v.to_string(),
                _ => false,
            },
            KillSwitchScope::Beacon => want == Some(target.beacon_id.to_string().as_str()),
        }
    }
}

/// Operator input for a new switch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewKillSwitch {
    pub scope: KillSwitchScope,
    pub target: Option<String>,
    pub reason: String,
    #[serde(skip)]
    pub created_by: DbId,
    pub expires_at: Option<Timestamp>,
}

/// What a scan resolves to, for kill-switch matching.
#[derive(Debug, Clone, Copy)]
pub struct ScanTarget<'a> {
    pub beacon_id: DbId,
    pub vendor_id: Option<DbId>,
    pub feature: &'a str,
    pub city: Option<&'a str>,
}

/// Find the most specific live switch that blocks `target`.
pub fn find_blocking<'s>(
    switches: &'s [KillSwitch],
    target: &ScanTarget<'_>,
    now: Timestamp,
) -> Option<&'s KillSwitch> {
    switches
        .iter()
        .filter(|s| s.is_live(now) && s.matches(target))
        .max_by_key(|s| s.scope.precedence())
}

pub fn is_blocked(switches: &[KillSwitch], target: &ScanTarget<'_>, now: Timestamp) -> bool {
    find_blocking(switches, target, now).is_some()
}

/// Validate an operator-supplied switch before it is stored.
pub fn validate_new(scope: KillSwitchScope, target: Option<&str>) -> Result<(), String> {
    match (scope, target.map(str::trim)) {
        (KillSwitchScope::Global, None) => Ok(()),
        (KillSwitchScope::Global, Some(_)) => Err("global switches take no target".into()),
        (_, None) | (_, Some("")) => Err(format!("{} switches need a target", scope.as_str())),
        (KillSwitchScope::Vendor | KillSwitchScope::Beacon, Some(t)) if t.parse::<DbId>().is_err() => {
            Err(format!("{} target must be a numeric id", scope.as_str()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn switch(id: DbId, scope: KillSwitchScope, target: Option<&str>) -> KillSwitch {
        KillSwitch {
            id,
            scope,
            target: target.map(Into::into),
            reason: "incident".into(),
            is_active: true,
            created_by: 1,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    fn london_checkin() -> ScanTarget<'static> {
        ScanTarget { beacon_id: 42, vendor_id: Some(7), feature: "checkin", city: Some("London") }
    }

    #[test]
    fn city_switch_blocks_any_beacon_in_city() {
        let switches = vec![switch(1, KillSwitchScope::City, Some("london"))];
        assert!(is_blocked(&switches, &london_checkin(), Utc::now()));

        let paris = ScanTarget { city: Some("Paris"), ..london_checkin() };
        assert!(!is_blocked(&switches, &paris, Utc::now()));
    }

    #[test]
    fn most_specific_switch_wins() {
        let switches = vec![
            switch(1, KillSwitchScope::Global, None),
            switch(2, KillSwitchScope::City, Some("London")),
            switch(3, KillSwitchScope::Vendor, Some("7")),
            switch(4, KillSwitchScope::Feature, Some("checkin")),
        ];
        let hit = find_blocking(&switches, &london_checkin(), Utc::now()).unwrap();
        assert_eq!(hit.id, 3);

        let mut with_beacon = switches.clone();
        with_beacon.push(switch(5, KillSwitchScope::Beacon, Some("42")));
        let hit = find_blocking(&with_beacon, &london_checkin(), Utc::now()).unwrap();
        assert_eq!(hit.scope, KillSwitchScope::Beacon);
    }

    #[test]
    fn inactive_and_expired_switches_are_ignored() {
        let now = Utc::now();
        let mut off = switch(1, KillSwitchScope::Global, None);
        off.is_active = false;
        let mut lapsed = switch(2, KillSwitchScope::Global, None);
        lapsed.expires_at = Some(now - Duration::minutes(1));
        assert!(!is_blocked(&[off, lapsed], &london_checkin(), now));
    }

    #[test]
    fn feature_switch_only_hits_its_feature() {
        let switches = vec![switch(1, KillSwitchScope::Feature, Some("marketplace"))];
        assert!(!is_blocked(&switches, &london_checkin(), Utc::now()));
        let shop = ScanTarget { feature: "marketplace", ..london_checkin() };
        assert!(is_blocked(&switches, &shop, Utc::now()));
    }

    #[test]
    fn validate_new_switches() {
        assert!(validate_new(KillSwitchScope::Global, None).is_ok());
        assert!(validate_new(KillSwitchScope::Global, Some("x")).is_err());
        assert!(validate_new(KillSwitchScope::City, None).is_err());
        assert!(validate_new(KillSwitchScope::City, Some("Berlin")).is_ok());
        assert!(validate_new(KillSwitchScope::Beacon, Some("abc")).is_err());
        assert!(validate_new(KillSwitchScope::Beacon, Some("12")).is_ok());
    }

    #[test]
    fn precedence_matches_ordering() {
        assert!(KillSwitchScope::Beacon > KillSwitchScope::Vendor);
        assert!(KillSwitchScope::Vendor.precedence() > KillSwitchScope::Feature.precedence());
        assert!(KillSwitchScope::City.precedence() > KillSwitchScope::Global.precedence());
    }
}
