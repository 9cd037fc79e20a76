//! HTTP surface.
//!
//! | route | response |
//! |---|---|
//! | `GET /sensors[?hours=N]` | [`SensorsResponse`] |
//! | `GET /sensors/summary` | `[ReadingSummary]` |
//! | `GET /dashboard` | [`DashboardView`] |
//! | `GET /health` | `{"status": "ok"}` |
//!
//! Query failures answer `{"error": "..."}` with 404 when the store is missing
//! and 500 otherwise.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use sensorwatch_types::{ReadingSummary, SensorsResponse};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::app::{App, DashboardView};
use crate::data::QueryService;
use crate::error::Error;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub query: QueryService,
    pub app: Arc<App>,
}

#[derive(Debug, Deserialize)]
struct SensorsParams {
    hours: Option<f64>,
}

/// Handler failure, rendered as `{"error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Query(Error),
    BadRequest(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Query(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Query(err) if err.is_store_unavailable() => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            ApiError::Query(err) => {
                tracing::error!("Query failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

async fn handle_sensors(
    State(state): State<ServerState>,
    Query(params): Query<SensorsParams>,
) -> Result<Json<SensorsResponse>, ApiError> {
    let response = match params.hours {
        None => state.query.query().await?,
        Some(hours) if hours.is_finite() && hours > 0.0 => {
            let window = Duration::try_from_secs_f64(hours * 3600.0)
                .map_err(|e| ApiError::BadRequest(format!("hours out of range: {}", e)))?;
            state.query.query_window(window).await?
        }
        Some(hours) => {
            return Err(ApiError::BadRequest(format!(
                "hours must be a positive number, got {}",
                hours
            )))
        }
    };
    Ok(Json(response))
}

async fn handle_summary(
    State(state): State<ServerState>,
) -> Result<Json<Vec<ReadingSummary>>, ApiError> {
    Ok(Json(state.query.summary().await?))
}

async fn handle_dashboard(State(state): State<ServerState>) -> Json<DashboardView> {
    Json(state.app.view())
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the router.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/sensors", get(handle_sensors))
        .route("/sensors/summary", get(handle_summary))
        .route("/dashboard", get(handle_dashboard))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    bind: &str,
    state: ServerState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LastUpdatePolicy, QueryOptions};
    use crate::feed::LinkState;
    use crate::poller::PollState;
    use crate::store::{MemoryStore, ReadingStore, SqliteStore};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{DateTime, Utc};
    use http_body_util::BodyExt;
    use sensorwatch_types::{MeasurementKind, Reading, StatusMap};
    use tokio::sync::watch;
    use tower::ServiceExt;

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl ReadingStore for BrokenStore {
        async fn readings_since(&self, _cutoff: DateTime<Utc>) -> crate::Result<Vec<Reading>> {
            Err(Error::QueryFailed("malformed row".to_string()))
        }

        async fn summary(&self) -> crate::Result<Vec<ReadingSummary>> {
            Err(Error::QueryFailed("malformed row".to_string()))
        }

        fn description(&self) -> &str {
            "broken"
        }
    }

    fn state(store: Arc<dyn ReadingStore>) -> ServerState {
        let (_, statuses) = watch::channel(Arc::new(StatusMap::new()));
        let (_, link) = watch::channel(LinkState::connecting());
        let (_, polls) = watch::channel(PollState::default());

        ServerState {
            query: QueryService::new(store, QueryOptions::default()),
            app: Arc::new(App::from_channels(
                statuses,
                link,
                polls,
                LastUpdatePolicy::default(),
            )),
        }
    }

    async fn get_json(state: ServerState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn recent(sensor: &str, kind: MeasurementKind, value: f64, hours_ago: i64) -> Reading {
        Reading::new(
            sensor,
            kind,
            value,
            "",
            Utc::now() - chrono::Duration::hours(hours_ago),
        )
    }

    #[tokio::test]
    async fn test_sensors_shape() {
        let store = MemoryStore::with_readings(vec![
            recent("s1", MeasurementKind::Temperature, 20.0, 1),
            recent("s1", MeasurementKind::Temperature, 19.0, 30),
        ]);
        let (status, body) = get_json(state(Arc::new(store)), "/sensors").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["timestamp"].is_string());
        assert_eq!(body["sensors"]["s1"]["temperature"]["value"], 20.0);
        assert!(body["sensors"]["s1"].get("humidity").is_none());
        assert_eq!(body["sensors"]["s1"]["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sensors_hours_override() {
        let store: Arc<dyn ReadingStore> = Arc::new(MemoryStore::with_readings(vec![
            recent("s1", MeasurementKind::Temperature, 20.0, 1),
            recent("s1", MeasurementKind::Temperature, 19.0, 30),
        ]));

        let (status, body) = get_json(state(store.clone()), "/sensors?hours=48").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sensors"]["s1"]["history"].as_array().unwrap().len(), 2);

        let (status, body) = get_json(state(store), "/sensors?hours=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("positive"));
    }

    #[tokio::test]
    async fn test_missing_store_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("sensor_data.db"));

        let (status, body) = get_json(state(Arc::new(store)), "/sensors").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_other_failures_are_500() {
        let (status, body) = get_json(state(Arc::new(BrokenStore)), "/sensors").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("malformed row"));

        let (status, _) = get_json(state(Arc::new(BrokenStore)), "/sensors/summary").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_summary_dashboard_and_health() {
        let store = MemoryStore::with_readings(vec![
            recent("s1", MeasurementKind::Humidity, 40.0, 1),
            recent("s1", MeasurementKind::Humidity, 60.0, 2),
        ]);
        let state = state(Arc::new(store));

        let (status, body) = get_json(state.clone(), "/sensors/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["sensor_id"], "s1");
        assert_eq!(body[0]["kind"], "humidity");
        assert_eq!(body[0]["count"], 2);
        assert_eq!(body[0]["avg"], 50.0);

        let (status, body) = get_json(state.clone(), "/dashboard").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["loading"], true);
        assert_eq!(body["connectivity"], "connecting");
        assert!(body["sensors"].as_object().unwrap().is_empty());

        let (status, body) = get_json(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
