//! Venue-scale geofence classification.
//!
//! Distances use a flat-earth approximation: the radius is converted to a
//! squared-degree threshold and compared against the squared offset of the
//! scan point. Error stays well under a metre at venue radii (100-200 m),
//! which is why [`Geofence::validate`] caps the radius.

use serde::{Deserialize, Serialize};

/// Metres per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Largest radius the planar approximation is trusted for.
pub const MAX_GEOFENCE_RADIUS_M: f64 = 5_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub center: GeoPoint,
    pub radius_m: f64,
}

impl Geofence {
    /// Reject fences the approximation cannot serve.
    pub fn validate(&self) -> Result<(), String> {
        if !self.center.is_valid() {
            return Err("geofence center is not a valid coordinate".into());
        }
        if !(self.radius_m > 0.0 && self.radius_m <= MAX_GEOFENCE_RADIUS_M) {
            return Err(format!(
                "geofence radius must be within (0, {MAX_GEOFENCE_RADIUS_M}] metres"
            ));
        }
        Ok(())
    }

    fn threshold_deg_sq(&self) -> f64 {
        let r = self.radius_m / METERS_PER_DEGREE;
        r * r
    }
}

/// Outcome of a geo check, persisted on the scan event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoClass {
    Inside,
    Outside,
    /// The scan carried no usable coordinates.
    Unknown,
    /// The beacon has no geofence to check against.
    Unfenced,
}

impl GeoClass {
    pub fn as_str(self) -> &'static str {
        match self {
            GeoClass::Inside => "inside",
            GeoClass::Outside => "outside",
            GeoClass::Unknown => "unknown",
            GeoClass::Unfenced => "unfenced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeoResult {
    pub inside_venue: bool,
    pub class: GeoClass,
}

/// Classify a scan point against a beacon's fence.
///
/// Missing coordinates are always `inside_venue = false`: any XP that depends
/// on presence must fail closed. A beacon without a fence likewise never
/// counts as "inside".
pub fn classify(point: Option<GeoPoint>, fence: Option<&Geofence>) -> GeoResult {
    let Some(fence) = fence else {
        return GeoResult { inside_venue: false, class: GeoClass::Unfenced };
    };
    let Some(point) = point.filter(GeoPoint::is_valid) else {
        return GeoResult { inside_venue: false, class: GeoClass::Unknown };
    };

    let d_lat = point.lat - fence.center.lat;
    let d_lng = (point.lng - fence.center.lng) * fence.center.lat.to_radians().cos();
    let inside = d_lat * d_lat + d_lng * d_lng <= fence.threshold_deg_sq();

    GeoResult {
        inside_venue: inside,
        class: if inside { GeoClass::Inside } else { GeoClass::Outside },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fence() -> Geofence {
        // Shoreditch, London
        Geofence { center: GeoPoint::new(51.5245, -0.0780), radius_m: 150.0 }
    }

    #[test]
    fn point_at_center_is_inside() {
        let r = classify(Some(GeoPoint::new(51.5245, -0.0780)), Some(&fence()));
        assert!(r.inside_venue);
        assert_eq!(r.class, GeoClass::Inside);
    }

    #[test]
    fn point_100m_north_is_inside() {
        let lat = 51.5245 + 100.0 / METERS_PER_DEGREE;
        let r = classify(Some(GeoPoint::new(lat, -0.0780)), Some(&fence()));
        assert!(r.inside_venue);
    }

    #[test]
    fn point_200m_north_is_outside() {
        let lat = 51.5245 + 200.0 / METERS_PER_DEGREE;
        let r = classify(Some(GeoPoint::new(lat, -0.0780)), Some(&fence()));
        assert!(!r.inside_venue);
        assert_eq!(r.class, GeoClass::Outside);
    }

    #[test]
    fn longitude_offset_is_scaled_by_latitude() {
        // 120 m east at London's latitude is roughly 0.00173 degrees of longitude.
        let d_lng = 120.0 / (METERS_PER_DEGREE * 51.5245_f64.to_radians().cos());
        let r = classify(Some(GeoPoint::new(51.5245, -0.0780 + d_lng)), Some(&fence()));
        assert!(r.inside_venue);
    }

    #[test]
    fn missing_coordinates_fail_closed() {
        let r = classify(None, Some(&fence()));
        assert!(!r.inside_venue);
        assert_eq!(r.class, GeoClass::Unknown);
    }

    #[test]
    fn garbage_coordinates_fail_closed() {
        let r = classify(Some(GeoPoint::new(f64::NAN, 0.0)), Some(&fence()));
        assert_eq!(r.class, GeoClass::Unknown);
        let r = classify(Some(GeoPoint::new(123.0, 0.0)), Some(&fence()));
        assert_eq!(r.class, GeoClass::Unknown);
    }

    #[test]
    fn unfenced_beacon_is_never_inside() {
        let r = classify(Some(GeoPoint::new(51.5, -0.07)), None);
        assert!(!r.inside_venue);
        assert_eq!(r.class, GeoClass::Unfenced);
    }

    #[test]
    fn validate_rejects_city_scale_radius() {
        let mut f = fence();
        f.radius_m = 20_000.0;
        assert!(f.validate().is_err());
        f.radius_m = 0.0;
        assert!(f.validate().is_err());
        f.radius_m = 150.0;
        assert!(f.validate().is_ok());
    }
}
