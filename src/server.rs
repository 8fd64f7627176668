//! Local HTTP endpoint for map front-ends.
//!
//! - `GET /api/pollution` - live station list (`Station[]`)
//! - `GET /api/pollution/points` - cached real + interpolated points
//!
//! Failures answer `500 {"error": "Failed to fetch pollution data"}`. Every
//! response allows any origin.

use crate::api::AirQualitySource;
use crate::db::KvStore;
use crate::pipeline::PollutionService;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};

const FETCH_ERROR: &str = "Failed to fetch pollution data";

pub fn create_router<S, K>(service: Arc<PollutionService<S, K>>) -> Router
where
    S: AirQualitySource + 'static,
    K: KvStore + 'static,
{
    Router::new()
        .route("/api/pollution", get(list_stations::<S, K>))
        .route("/api/pollution/points", get(list_points::<S, K>))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .with_state(service)
}

pub async fn list_stations<S, K>(State(service): State<Arc<PollutionService<S, K>>>) -> Response
where
    S: AirQualitySource,
    K: KvStore,
{
    match service.stations().await {
        Ok(stations) => (StatusCode::OK, Json(stations)).into_response(),
        Err(e) => {
            error!("GET /api/pollution failed: {}", e);
            fetch_error()
        }
    }
}

pub async fn list_points<S, K>(State(service): State<Arc<PollutionService<S, K>>>) -> Response
where
    S: AirQualitySource,
    K: KvStore,
{
    match service.points().await {
        Ok(points) => (StatusCode::OK, Json(points)).into_response(),
        Err(e) => {
            error!("GET /api/pollution/points failed: {}", e);
            fetch_error()
        }
    }
}

fn fetch_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": FETCH_ERROR })),
    )
        .into_response()
}

/// Serves the router on `0.0.0.0:port` until Ctrl+C.
pub async fn serve<S, K>(service: Arc<PollutionService<S, K>>, port: u16) -> std::io::Result<()>
where
    S: AirQualitySource + 'static,
    K: KvStore + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP endpoint listening on http://{}", addr);

    axum::serve(listener, create_router(service))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MeasurementQuery;
    use crate::cache::Cache;
    use crate::config::Config;
    use crate::db::MemoryStore;
    use crate::error::{Error, Result};
    use crate::fetcher::{FetchStrategy, Fetcher};
    use crate::models::{
        Coordinates, OpenAqCoordinates, OpenAqLocation, OpenAqMeasurement, OpenAqParameter,
        OpenAqSensor,
    };
    use async_trait::async_trait;

    struct OneStation {
        up: bool,
    }

    #[async_trait]
    impl AirQualitySource for OneStation {
        async fn locations(&self, _: Coordinates, _: u32) -> Result<Vec<OpenAqLocation>> {
            if !self.up {
                return Err(Error::Status {
                    status: 500,
                    url: "/locations".into(),
                });
            }
            Ok(vec![OpenAqLocation {
                id: 3,
                name: "Varsity".into(),
                coordinates: Some(OpenAqCoordinates {
                    latitude: Some(51.08),
                    longitude: Some(-114.14),
                }),
                sensors: Some(vec![OpenAqSensor {
                    id: 30,
                    name: "pm25 µg/m³".into(),
                    parameter: Some(OpenAqParameter {
                        id: Some(2),
                        name: "pm25".into(),
                        units: "µg/m³".into(),
                        display_name: None,
                    }),
                }]),
            }])
        }

        async fn measurements(&self, _: i64, _: MeasurementQuery) -> Result<Vec<OpenAqMeasurement>> {
            Ok(vec![OpenAqMeasurement {
                value: Some(6.0),
                ..Default::default()
            }])
        }
    }

    fn service(up: bool) -> Arc<PollutionService<OneStation, MemoryStore>> {
        let fetcher = Fetcher::new(Arc::new(OneStation { up }), FetchStrategy::LatestOnly);
        let cache = Cache::new(Arc::new(MemoryStore::new()));
        Arc::new(PollutionService::new(fetcher, cache, &Config::default()))
    }

    #[tokio::test]
    async fn stations_endpoint_returns_ok() {
        let response = list_stations(State(service(true))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_500() {
        let response = list_stations(State(service(false))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = list_points(State(service(false))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn points_endpoint_returns_ok() {
        let response = list_points(State(service(true))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn spawn_router(up: bool) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(service(up))).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn routes_allow_any_origin() {
        let base = spawn_router(true).await;

        for path in ["/api/pollution", "/api/pollution/points"] {
            let response = reqwest::get(format!("{}{}", base, path)).await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            assert_eq!(
                response.headers()["access-control-allow-origin"],
                "*"
            );
        }
    }

    #[tokio::test]
    async fn failure_body_names_the_error() {
        let base = spawn_router(false).await;

        let response = reqwest::get(format!("{}/api/pollution/points", base))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "Failed to fetch pollution data" }));
    }

    #[tokio::test]
    async fn stations_route_serves_station_json() {
        let base = spawn_router(true).await;

        let stations: Vec<crate::models::Station> = reqwest::get(format!("{}/api/pollution", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].name, "Varsity");
        assert_eq!(stations[0].measurements[0].value, 6.0);
    }
}
