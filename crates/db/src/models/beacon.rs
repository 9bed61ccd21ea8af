//! Beacon row model.

use beacon_core::beacon::Beacon;
use beacon_core::error::StoreError;
use beacon_core::geo::{GeoPoint, Geofence};
use beacon_core::types::{DbId, Timestamp, Xp};
use sqlx::FromRow;

/// A row from the `beacons` table.
#[derive(Debug, Clone, FromRow)]
pub struct BeaconRow {
    pub id: DbId,
    pub code: String,
    pub beacon_type: String,
    pub subtype: Option<String>,
    pub label: String,
    pub status: String,
    pub owner_id: DbId,
    pub target_ref: Option<DbId>,
    pub vendor_id: Option<DbId>,
    pub city: Option<String>,
    pub xp_base: Option<Xp>,
    pub xp_multiplier: Option<f64>,
    pub scan_count: i64,
    pub scan_limit: Option<i64>,
    pub per_user_daily_limit: Option<i32>,
    pub geofence_lat: Option<f64>,
    pub geofence_lng: Option<f64>,
    pub geofence_radius_m: Option<f64>,
    pub active_from: Option<Timestamp>,
    pub active_until: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl TryFrom<BeaconRow> for Beacon {
    type Error = StoreError;

    fn try_from(row: BeaconRow) -> Result<Self, Self::Error> {
        let geofence = match (row.geofence_lat, row.geofence_lng, row.geofence_radius_m) {
            (Some(lat), Some(lng), Some(radius_m)) => Some(Geofence {
                center: GeoPoint::new(lat, lng),
                radius_m,
            }),
            _ => None,
        };
        Ok(Beacon {
            id: row.id,
            code: row.code,
            beacon_type: row.beacon_type,
            subtype: row.subtype,
            label: row.label,
            status: row.status.parse()?,
            owner_id: row.owner_id,
            target_ref: row.target_ref,
            vendor_id: row.vendor_id,
            city: row.city,
            xp_base: row.xp_base,
            xp_multiplier: row.xp_multiplier,
            scan_count: row.scan_count,
            scan_limit: row.scan_limit,
            per_user_daily_limit: row.per_user_daily_limit,
            geofence,
            active_from: row.active_from,
            active_until: row.active_until,
            created_at: row.created_at,
        })
    }
}
