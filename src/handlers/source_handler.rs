// src/handlers/source_handler.rs
//! Write routes for the in-memory backend. They let a host without Firebase
//! feed zone and order data through the same push path the live feeds use.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing;

use crate::{
    errors::{SparrowError, SparrowResult},
    models::{geofence::GeofenceConfig, order::OrderSnapshot},
    services::backend::MemoryBackend,
    state::AppState,
};

fn memory_backend(state: &AppState) -> SparrowResult<&Arc<MemoryBackend>> {
    state.memory_backend.as_ref().ok_or_else(|| {
        SparrowError::BackendUnavailable("data is read-only when backed by Firebase".to_string())
    })
}

pub async fn publish_geofence(
    State(state): State<Arc<AppState>>,
    Json(config): Json<GeofenceConfig>,
) -> SparrowResult<Json<GeofenceConfig>> {
    let backend = memory_backend(&state)?;
    config.validate()?;

    backend.publish_config(config);
    tracing::info!("Geofence published: radius={}km", config.radius_km);
    Ok(Json(config))
}

pub async fn upsert_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Json(mut order): Json<OrderSnapshot>,
) -> SparrowResult<Json<OrderSnapshot>> {
    let backend = memory_backend(&state)?;
    if order.id.is_empty() {
        order.id = order_id.clone();
    } else if order.id != order_id {
        return Err(SparrowError::bad_request(format!(
            "body id {} does not match path id {}",
            order.id, order_id
        )));
    }

    backend.upsert_order(order.clone());
    Ok(Json(order))
}

pub async fn remove_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> SparrowResult<StatusCode> {
    let backend = memory_backend(&state)?;
    if backend.order(&order_id).is_none() {
        return Err(SparrowError::order_not_found(order_id));
    }

    backend.remove_order(&order_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::OrderStatus;
    use crate::services::backend::{ConfigSource, OrderSource};
    use crate::state::AppConfig;
    use serde_json::json;

    async fn session(memory: bool) -> Arc<AppState> {
        let backend = Arc::new(MemoryBackend::new());
        let config_source: Arc<dyn ConfigSource> = backend.clone();
        let order_source: Arc<dyn OrderSource> = backend.clone();
        let memory_backend = memory.then_some(backend);
        Arc::new(
            AppState::with_sources(AppConfig::default(), config_source, order_source, memory_backend)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_published_zone_reaches_store() {
        let state = session(true).await;
        assert!(state.geofence.is_within_zone(13.50, 80.10));

        let config = GeofenceConfig::new(13.20, 80.10, 5.0).unwrap();
        publish_geofence(State(state.clone()), Json(config)).await.unwrap();
        assert!(!state.geofence.is_within_zone(13.50, 80.10));

        let bad: GeofenceConfig =
            serde_json::from_value(json!({"centerLat": 13.2, "centerLng": 80.1, "radiusKm": -1})).unwrap();
        let result = publish_geofence(State(state.clone()), Json(bad)).await;
        assert!(matches!(result, Err(SparrowError::InvalidGeofence(_))));
    }

    #[tokio::test]
    async fn test_order_writes_reach_feed() {
        let state = session(true).await;
        let order: OrderSnapshot = serde_json::from_value(json!({"status": "packed", "itemCount": 2})).unwrap();

        let Json(stored) = upsert_order(State(state.clone()), Path("ord-5".to_string()), Json(order))
            .await
            .unwrap();
        assert_eq!(stored.id, "ord-5");
        assert_eq!(state.order_feed.current().data[0].status, OrderStatus::Packed);

        let status = remove_order(State(state.clone()), Path("ord-5".to_string())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.order_feed.current().data.is_empty());

        let missing = remove_order(State(state.clone()), Path("ord-5".to_string())).await;
        assert!(matches!(missing, Err(SparrowError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_mismatched_order_id_is_rejected() {
        let state = session(true).await;
        let order: OrderSnapshot =
            serde_json::from_value(json!({"id": "ord-1", "status": "pending"})).unwrap();
        let result = upsert_order(State(state), Path("ord-2".to_string()), Json(order)).await;
        assert!(matches!(result, Err(SparrowError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_writes_need_memory_backend() {
        let state = session(false).await;
        let config = GeofenceConfig::new(13.20, 80.10, 5.0).unwrap();
        let result = publish_geofence(State(state), Json(config)).await;
        assert!(matches!(result, Err(SparrowError::BackendUnavailable(_))));
    }
}
