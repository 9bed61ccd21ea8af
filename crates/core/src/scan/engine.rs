use std::sync::Arc;

use serde_json::json;

use super::handlers::{self, HandlerCtx, Routed};
use super::{actions, ScanRequest, ScanResponse, ScanUi};
use crate::beacon::{Beacon, Unavailable};
use crate::geo::{self, GeoClass, GeoResult};
use crate::kill_switch::{self, ScanTarget};
use crate::ledger::XpLedger;
use crate::models::{Notification, ScanEvent, ScanSource};
use crate::ports::{Notifier, PaymentVerifier, ScanEventSink, Stores};
use crate::registry;
use crate::signed_link;
use crate::types::Xp;

/// Resolves scans against beacons and commits their effects.
///
/// `scan` never fails: every outcome, including infrastructure trouble, is
/// a [`ScanResponse`]. Each scan that resolves to a beacon records exactly
/// one [`ScanEvent`].
pub struct ScanEngine {
    stores: Stores,
    ledger: Arc<XpLedger>,
    verifier: Arc<dyn PaymentVerifier>,
    sink: Arc<dyn ScanEventSink>,
    notifier: Arc<dyn Notifier>,
    link_secret: Option<String>,
}

/// Mutable bookkeeping for one scan while it moves through the pipeline.
struct Trace {
    source: ScanSource,
    geo: GeoClass,
    signed_payload: Option<serde_json::Value>,
    anomalies: Vec<String>,
}

impl Trace {
    fn anomaly(&mut self, note: impl Into<String>) {
        self.anomalies.push(note.into());
    }
}

impl ScanEngine {
    pub fn new(
        stores: Stores,
        ledger: Arc<XpLedger>,
        verifier: Arc<dyn PaymentVerifier>,
        sink: Arc<dyn ScanEventSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { stores, ledger, verifier, sink, notifier, link_secret: None }
    }

    /// Enable `/l/{code}` signed links.
    pub fn with_link_secret(mut self, secret: impl Into<String>) -> Self {
        self.link_secret = Some(secret.into());
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn ledger(&self) -> &Arc<XpLedger> {
        &self.ledger
    }

    pub async fn scan(&self, req: ScanRequest) -> ScanResponse {
        let beacon = match self.stores.beacons.find_by_code(&req.code).await {
            Ok(Some(b)) => b,
            Ok(None) => {
                tracing::debug!(code = %req.code, "Scan for unknown beacon code");
                return ScanResponse {
                    ok: false,
                    action: actions::NOT_FOUND,
                    beacon: None,
                    xp_awarded: 0,
                    ui: ScanUi::NotFound { entity: "beacon" },
                };
            }
            Err(e) => {
                tracing::error!(error = %e, code = %req.code, "Beacon lookup failed");
                return ScanResponse {
                    ok: false,
                    action: actions::ERROR,
                    beacon: None,
                    xp_awarded: 0,
                    ui: ScanUi::RetryLater { reason: "beacon_lookup_failed" },
                };
            }
        };

        let mut trace = Trace {
            source: req.source,
            geo: GeoClass::Unknown,
            signed_payload: None,
            anomalies: Vec::new(),
        };
        let (routed, xp_awarded) = self.resolve(&beacon, &req, &mut trace).await;

        self.sink.record(ScanEvent {
            beacon_id: beacon.id,
            user_id: req.user_id,
            scanned_at: req.scanned_at,
            geo: trace.geo,
            action: routed.action.to_string(),
            ok: routed.ok,
            xp_awarded,
            source: trace.source,
            signed_payload: trace.signed_payload,
            anomaly: (!trace.anomalies.is_empty()).then(|| trace.anomalies.join("; ")),
        });

        ScanResponse {
            ok: routed.ok,
            action: routed.action,
            beacon: Some(beacon.summary()),
            xp_awarded,
            ui: routed.ui,
        }
    }

    async fn resolve(&self, beacon: &Beacon, req: &ScanRequest, trace: &mut Trace) -> (Routed, Xp) {
        if let Some(link) = &req.link {
            let Some(secret) = self.link_secret.as_deref() else {
                return (rejected(actions::UNAVAILABLE, unavailable(Unavailable::LinkInvalid)), 0);
            };
            match signed_link::verify(&beacon.code, link.expires_at, &link.sig, secret, req.scanned_at) {
                Ok(claims) => {
                    trace.source = ScanSource::Link;
                    trace.signed_payload = serde_json::to_value(claims).ok();
                }
                Err(e) => {
                    tracing::info!(beacon_id = beacon.id, error = %e, "Rejected signed link");
                    return (rejected(actions::UNAVAILABLE, unavailable(e.into())), 0);
                }
            }
        }

        let kind = beacon.kind();
        let feature = kind.map_or(beacon.beacon_type.as_str(), |k| k.feature());
        match self.stores.kill_switches.list_live(req.scanned_at).await {
            Ok(switches) => {
                let target = ScanTarget {
                    beacon_id: beacon.id,
                    vendor_id: beacon.vendor_id,
                    feature,
                    city: beacon.city.as_deref(),
                };
                if let Some(switch) = kill_switch::find_blocking(&switches, &target, req.scanned_at) {
                    tracing::info!(
                        beacon_id = beacon.id,
                        kill_switch_id = switch.id,
                        scope = switch.scope.as_str(),
                        "Scan blocked by kill switch"
                    );
                    let ui = ScanUi::Blocked { scope: switch.scope, reason: switch.reason.clone() };
                    return (rejected(actions::BLOCKED, ui), 0);
                }
            }
            // An unreadable overlay must not let a disabled feature through.
            Err(e) => {
                tracing::error!(error = %e, beacon_id = beacon.id, "Kill switch lookup failed");
                trace.anomaly(format!("kill_switch_lookup: {e}"));
                let ui = ScanUi::RetryLater { reason: "kill_switch_unavailable" };
                return (rejected(actions::ERROR, ui), 0);
            }
        }

        if let Err(reason) = beacon.availability(req.scanned_at) {
            return (rejected(actions::UNAVAILABLE, unavailable(reason)), 0);
        }

        let meta = match registry::lookup(&beacon.beacon_type) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::error!(beacon_id = beacon.id, error = %e, "Beacon type missing from registry");
                self.alert("registry_miss", json!({
                    "beacon_id": beacon.id,
                    "beacon_type": beacon.beacon_type,
                }));
                trace.anomaly("registry_miss");
                return (unsupported(beacon), 0);
            }
        };
        let Some(kind) = kind else {
            tracing::warn!(
                beacon_id = beacon.id,
                beacon_type = %beacon.beacon_type,
                subtype = ?beacon.subtype,
                "Unsupported beacon type/subtype combination"
            );
            return (unsupported(beacon), 0);
        };

        let geo_result: GeoResult = geo::classify(req.point, beacon.geofence.as_ref());
        trace.geo = geo_result.class;

        // Held until the handler reports whether the scan did anything.
        let mut quota_unit = None;
        if let (Some(user_id), Some(limit)) = (req.user_id, beacon.per_user_daily_limit) {
            if handlers::is_effectful(kind, req.mode) {
                let day = req.scanned_at.date_naive();
                match self.stores.beacons.consume_user_quota(beacon.id, user_id, day, limit).await {
                    Ok(true) => quota_unit = Some((user_id, day)),
                    Ok(false) => {
                        let ui = unavailable(Unavailable::DailyLimitReached);
                        return (rejected(actions::UNAVAILABLE, ui), 0);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, beacon_id = beacon.id, "Daily quota check failed; allowing scan");
                        trace.anomaly(format!("quota_check: {e}"));
                    }
                }
            }
        }

        let ctx = HandlerCtx {
            stores: &self.stores,
            verifier: self.verifier.as_ref(),
            notifier: self.notifier.as_ref(),
            beacon,
            meta,
            request: req,
            geo: geo_result,
        };
        let routed = handlers::route(kind, &ctx).await;

        if let Some((user_id, day)) = quota_unit.filter(|_| !routed.counted) {
            if let Err(e) = self.stores.beacons.release_user_quota(beacon.id, user_id, day).await {
                tracing::warn!(error = %e, beacon_id = beacon.id, user_id, "Daily quota release failed");
                trace.anomaly(format!("quota_release: {e}"));
            }
        }

        if routed.counted {
            match self.stores.beacons.increment_scan_count(beacon.id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::info!(beacon_id = beacon.id, "Scan limit reached during scan");
                    trace.anomaly("scan_limit_reached");
                }
                Err(e) => {
                    tracing::warn!(error = %e, beacon_id = beacon.id, "Scan count increment failed");
                    trace.anomaly(format!("scan_count: {e}"));
                }
            }
        }

        let mut xp_awarded = 0;
        if let Some(grant) = &routed.xp {
            match self
                .ledger
                .award(grant.user_id, grant.amount, &grant.dedupe_key, grant.reason, grant.metadata.clone())
                .await
            {
                Ok(award) => {
                    // XP for someone other than the scanner (ticket owner at the
                    // door) is credited but not reported to the scanner.
                    if Some(grant.user_id) == req.user_id {
                        xp_awarded = award.amount;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        beacon_id = beacon.id,
                        user_id = grant.user_id,
                        dedupe_key = %grant.dedupe_key,
                        "XP ledger write failed; serving scan without XP"
                    );
                    self.alert("ledger_write_failed", json!({
                        "beacon_id": beacon.id,
                        "user_id": grant.user_id,
                        "dedupe_key": grant.dedupe_key,
                        "error": e.to_string(),
                    }));
                    trace.anomaly(format!("ledger: {e}"));
                }
            }
        }

        (routed, xp_awarded)
    }

    fn alert(&self, what: &str, detail: serde_json::Value) {
        self.notifier.notify(
            Notification::new("ops.alert").with_payload(json!({ "alert": what, "detail": detail })),
        );
    }
}

fn rejected(action: &'static str, ui: ScanUi) -> Routed {
    Routed { ok: false, action, ui, xp: None, counted: false }
}

fn unavailable(reason: Unavailable) -> ScanUi {
    ScanUi::Unavailable { reason }
}

fn unsupported(beacon: &Beacon) -> Routed {
    rejected(
        actions::UNSUPPORTED,
        ScanUi::Unsupported {
            beacon_type: beacon.beacon_type.clone(),
            subtype: beacon.subtype.clone(),
        },
    )
}
