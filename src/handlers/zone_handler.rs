// src/handlers/zone_handler.rs
use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{SparrowError, SparrowResult},
    models::geofence::GeofencePhase,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ZoneQuery {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneCheck {
    pub within_zone: bool,
    pub distance_km: f64,
    pub phase: GeofencePhase,
}

pub async fn check_zone(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ZoneQuery>,
) -> SparrowResult<Json<ZoneCheck>> {
    if !query.lat.is_finite() || !query.lng.is_finite() {
        return Err(SparrowError::bad_request("lat and lng must be finite numbers"));
    }

    let geofence = &state.geofence;
    Ok(Json(ZoneCheck {
        within_zone: geofence.is_within_zone(query.lat, query.lng),
        distance_km: geofence.distance_from_center(query.lat, query.lng),
        phase: geofence.phase(),
    }))
}
