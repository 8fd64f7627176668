use async_trait::async_trait;
use haze_tui::api::{AirQualitySource, MeasurementQuery};
use haze_tui::cache::Cache;
use haze_tui::config::Config;
use haze_tui::db::{MemoryStore, SqliteStore};
use haze_tui::error::Result;
use haze_tui::fetcher::{FetchStrategy, Fetcher};
use haze_tui::models::{
    Coordinates, OpenAqCoordinates, OpenAqDatetime, OpenAqLocation, OpenAqMeasurement,
    OpenAqParameter, OpenAqPeriod, OpenAqSensor,
};
use haze_tui::pipeline::PollutionService;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct TwoStations {
    location_calls: AtomicUsize,
}

fn pm25() -> OpenAqParameter {
    OpenAqParameter {
        id: Some(2),
        name: "pm25".into(),
        units: "µg/m³".into(),
        display_name: Some("PM2.5".into()),
    }
}

fn location(id: i64, name: &str, lat: f64, lon: f64, sensor_id: i64) -> OpenAqLocation {
    OpenAqLocation {
        id,
        name: name.into(),
        coordinates: Some(OpenAqCoordinates {
            latitude: Some(lat),
            longitude: Some(lon),
        }),
        sensors: Some(vec![OpenAqSensor {
            id: sensor_id,
            name: "pm25 µg/m³".into(),
            parameter: Some(pm25()),
        }]),
    }
}

fn measured(value: f64, utc: &str) -> OpenAqMeasurement {
    OpenAqMeasurement {
        value: Some(value),
        period: Some(OpenAqPeriod {
            datetime_from: None,
            datetime_to: Some(OpenAqDatetime {
                utc: Some(utc.into()),
                local: None,
            }),
        }),
        ..Default::default()
    }
}

#[async_trait]
impl AirQualitySource for TwoStations {
    async fn locations(&self, _: Coordinates, _: u32) -> Result<Vec<OpenAqLocation>> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            location(1, "Downtown", 51.05, -114.07, 10),
            location(2, "Airport", 51.13, -114.01, 20),
        ])
    }

    async fn measurements(&self, sensor_id: i64, _: MeasurementQuery) -> Result<Vec<OpenAqMeasurement>> {
        Ok(match sensor_id {
            10 => vec![
                measured(10.0, "2024-05-01T10:00:00Z"),
                measured(20.0, "2024-05-01T11:00:00Z"),
            ],
            20 => vec![measured(5.0, "2024-05-01T10:30:00Z")],
            _ => Vec::new(),
        })
    }
}

fn service<K: haze_tui::db::KvStore>(
    store: K,
) -> (Arc<TwoStations>, PollutionService<TwoStations, K>) {
    let source = Arc::new(TwoStations::default());
    let fetcher = Fetcher::new(source.clone(), FetchStrategy::LatestOnly);
    let service = PollutionService::new(fetcher, Cache::new(Arc::new(store)), &Config::default());
    (source, service)
}

#[tokio::test]
async fn stations_carry_latest_reading_per_pollutant() {
    let (_, service) = service(MemoryStore::new());
    let stations = service.stations().await.unwrap();

    assert_eq!(stations.len(), 2);
    assert_eq!(stations[0].name, "Downtown");
    assert_eq!(stations[0].measurements.len(), 1);
    assert_eq!(stations[0].measurements[0].value, 20.0);
    assert_eq!(stations[1].measurements[0].value, 5.0);
}

#[tokio::test]
async fn points_are_interpolated_between_stations() {
    let (_, service) = service(MemoryStore::new());
    let points = service.points().await.unwrap();

    assert_eq!(points.len(), 11);
    assert_eq!(points[0].id, Some(1));
    assert_eq!(points[0].value, 20.0);
    assert_eq!(points[10].id, Some(2));
    assert_eq!(points[10].value, 5.0);
    assert!(points[1..10].iter().all(|p| p.is_interpolated()));
    assert!(points.iter().all(|p| (5.0..=20.0).contains(&p.value)));
}

#[tokio::test]
async fn second_points_call_is_served_from_cache() {
    let (source, service) = service(MemoryStore::new());
    let first = service.points().await.unwrap();
    let second = service.points().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(source.location_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sqlite_store_backs_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("haze.db")).unwrap();
    let (source, service) = service(store);

    service.points().await.unwrap();
    service.points().await.unwrap();
    assert_eq!(source.location_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refresh_bypasses_fresh_cache_and_reseeds_it() {
    let (source, service) = service(MemoryStore::new());
    service.points().await.unwrap();

    let refreshed = service.refresh().await.unwrap();
    assert_eq!(refreshed.len(), 11);
    assert_eq!(source.location_calls.load(Ordering::SeqCst), 2);

    let cached = service.points().await.unwrap();
    assert_eq!(cached, refreshed);
    assert_eq!(source.location_calls.load(Ordering::SeqCst), 2);
}
