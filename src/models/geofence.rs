// src/models/geofence.rs
use serde::{Deserialize, Serialize};

use crate::errors::{SparrowError, SparrowResult};
use crate::utils::distance::haversine_km;

/// The serviceable delivery zone: a single circle around the store.
///
/// Mastered by the backend. The client only ever holds a read-only copy and
/// replaces it wholesale on every update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceConfig {
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_km: f64,
}

impl GeofenceConfig {
    pub fn new(center_lat: f64, center_lng: f64, radius_km: f64) -> SparrowResult<Self> {
        let config = Self {
            center_lat,
            center_lng,
            radius_km,
        };
        config.validate()?;
        Ok(config)
    }

    /// Radius must be a positive, finite number of kilometers.
    pub fn validate(&self) -> SparrowResult<()> {
        if !self.radius_km.is_finite() || self.radius_km <= 0.0 {
            return Err(SparrowError::InvalidGeofence(format!(
                "radius_km must be positive, got {}",
                self.radius_km
            )));
        }
        if !self.center_lat.is_finite() || !self.center_lng.is_finite() {
            return Err(SparrowError::InvalidGeofence(
                "center coordinates must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn distance_from_center(&self, lat: f64, lng: f64) -> f64 {
        haversine_km(self.center_lat, self.center_lng, lat, lng)
    }

    /// Boundary inclusive.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        self.distance_from_center(lat, lng) <= self.radius_km
    }
}

/// Lifecycle of the geofence store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofencePhase {
    Uninitialized,
    Loading,
    Ready,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_radius() {
        assert!(GeofenceConfig::new(13.2, 80.1, 0.0).is_err());
        assert!(GeofenceConfig::new(13.2, 80.1, -1.0).is_err());
        assert!(GeofenceConfig::new(13.2, 80.1, f64::NAN).is_err());
        assert!(GeofenceConfig::new(f64::INFINITY, 80.1, 5.0).is_err());
        assert!(GeofenceConfig::new(13.2, 80.1, 5.0).is_ok());
    }

    #[test]
    fn test_deserializes_backend_shape() {
        let config: GeofenceConfig =
            serde_json::from_str(r#"{"centerLat":13.2,"centerLng":80.1,"radiusKm":5}"#).unwrap();
        assert_eq!(config.center_lat, 13.2);
        assert_eq!(config.center_lng, 80.1);
        assert_eq!(config.radius_km, 5.0);
    }

    #[test]
    fn test_contains_center_and_boundary() {
        let config = GeofenceConfig::new(13.20, 80.10, 5.0).unwrap();
        assert!(config.contains(13.20, 80.10));

        // a point due north whose distance is exactly the radius
        let boundary_lat = 13.20 + (5.0 / crate::utils::distance::EARTH_RADIUS_KM).to_degrees();
        let boundary = GeofenceConfig {
            radius_km: config.distance_from_center(boundary_lat, 80.10),
            ..config
        };
        assert!(boundary.contains(boundary_lat, 80.10));

        let outside = GeofenceConfig {
            radius_km: boundary.radius_km - 1e-6,
            ..config
        };
        assert!(!outside.contains(boundary_lat, 80.10));
    }
}
