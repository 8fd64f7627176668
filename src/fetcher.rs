//! Station and sensor acquisition.
//!
//! One call lists the stations around a centre point, then every sensor of
//! every station is read concurrently. A failed station listing aborts the
//! cycle. A failed sensor only loses that sensor's readings.

use crate::api::{AirQualitySource, MeasurementQuery};
use crate::error::{Error, Result};
use crate::models::{Coordinates, OpenAqLocation, OpenAqMeasurement, OpenAqSensor, Reading, Station};
use crate::reduce::{assemble_station, reduce_latest};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How much of each sensor's history to pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// One request per sensor for its most recent measurement.
    LatestOnly,
    /// Numbered pages until one comes back shorter than `page_size`.
    FullHistory { page_size: u32 },
}

pub struct Fetcher<S> {
    source: Arc<S>,
    strategy: FetchStrategy,
    dump_dir: Option<PathBuf>,
}

impl<S: AirQualitySource> Fetcher<S> {
    pub fn new(source: Arc<S>, strategy: FetchStrategy) -> Self {
        Self {
            source,
            strategy,
            dump_dir: None,
        }
    }

    /// Directory receiving `<sensor_id>.json` dumps in full-history mode.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    /// All stations within `radius_meters` of `center` that reported at
    /// least one usable reading, in upstream order.
    pub async fn fetch_stations(&self, center: Coordinates, radius_meters: u32) -> Result<Vec<Station>> {
        let locations = self
            .source
            .locations(center, radius_meters)
            .await
            .map_err(|e| {
                error!("Failed to fetch locations: {}", e);
                Error::UpstreamUnavailable(e.to_string())
            })?;
        info!(
            "Found {} locations within {}m of ({}, {})",
            locations.len(),
            radius_meters,
            center.latitude,
            center.longitude
        );

        let stations: Vec<Station> = join_all(locations.iter().map(|loc| self.fetch_station(loc)))
            .await
            .into_iter()
            .flatten()
            .collect();

        info!("{} of {} locations reported data", stations.len(), locations.len());
        Ok(stations)
    }

    async fn fetch_station(&self, location: &OpenAqLocation) -> Option<Station> {
        let sensors = location.sensors();
        if sensors.is_empty() {
            return None;
        }

        let readings = join_all(sensors.iter().map(|sensor| async move {
            reduce_latest(self.fetch_sensor_readings(sensor).await)
        }))
        .await;

        assemble_station(location, readings)
    }

    /// Usable readings for one sensor under the configured strategy.
    ///
    /// Never fails: an upstream error is logged and yields no readings.
    pub async fn fetch_sensor_readings(&self, sensor: &OpenAqSensor) -> Vec<Reading> {
        let measurements = match self.fetch_measurements(sensor.id).await {
            Ok(measurements) => measurements,
            Err(e) => {
                warn!("{}", e);
                return Vec::new();
            }
        };

        if let FetchStrategy::FullHistory { .. } = self.strategy {
            self.dump(sensor.id, &measurements).await;
        }

        measurements
            .iter()
            .filter_map(|m| m.to_reading(sensor.parameter.as_ref()))
            .collect()
    }

    async fn fetch_measurements(&self, sensor_id: i64) -> Result<Vec<OpenAqMeasurement>> {
        let failed = |e: Error| Error::SensorFetchFailed {
            sensor_id,
            reason: e.to_string(),
        };

        match self.strategy {
            FetchStrategy::LatestOnly => self
                .source
                .measurements(sensor_id, MeasurementQuery::Latest)
                .await
                .map_err(failed),
            FetchStrategy::FullHistory { page_size } => {
                let mut all = Vec::new();
                let mut page = 1;
                loop {
                    let batch = self
                        .source
                        .measurements(sensor_id, MeasurementQuery::Page { page, limit: page_size })
                        .await
                        .map_err(failed)?;
                    let short = batch.len() < page_size as usize;
                    all.extend(batch);
                    if short {
                        break;
                    }
                    page += 1;
                }
                debug!("Sensor {}: {} measurements over {} pages", sensor_id, all.len(), page);
                Ok(all)
            }
        }
    }

    async fn dump(&self, sensor_id: i64, measurements: &[OpenAqMeasurement]) {
        let Some(dir) = &self.dump_dir else {
            return;
        };
        let path = dir.join(format!("{}.json", sensor_id));

        let json = match serde_json::to_string_pretty(measurements) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not encode dump for sensor {}: {}", sensor_id, e);
                return;
            }
        };
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, json).await
        };
        if let Err(e) = written.await {
            warn!("Could not write {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpenAqCoordinates, OpenAqDatetime, OpenAqParameter};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSource {
        locations: Option<Vec<OpenAqLocation>>,
        // sensor id -> pages, page 1 first; a missing sensor is a 404
        pages: HashMap<i64, Vec<Vec<OpenAqMeasurement>>>,
        calls: Mutex<Vec<(i64, MeasurementQuery)>>,
    }

    #[async_trait]
    impl AirQualitySource for FakeSource {
        async fn locations(&self, _: Coordinates, _: u32) -> Result<Vec<OpenAqLocation>> {
            self.locations.clone().ok_or(Error::Status {
                status: 503,
                url: "/locations".into(),
            })
        }

        async fn measurements(
            &self,
            sensor_id: i64,
            query: MeasurementQuery,
        ) -> Result<Vec<OpenAqMeasurement>> {
            self.calls.lock().unwrap().push((sensor_id, query));
            let pages = self.pages.get(&sensor_id).ok_or(Error::Status {
                status: 404,
                url: format!("/sensors/{}/measurements", sensor_id),
            })?;
            let index = match query {
                MeasurementQuery::Latest => 0,
                MeasurementQuery::Page { page, .. } => page as usize - 1,
            };
            Ok(pages.get(index).cloned().unwrap_or_default())
        }
    }

    fn measurement(name: &str, value: f64, ts: &str) -> OpenAqMeasurement {
        OpenAqMeasurement {
            value: Some(value),
            parameter: Some(OpenAqParameter {
                id: None,
                name: name.into(),
                units: "µg/m³".into(),
                display_name: None,
            }),
            period: None,
            date: Some(OpenAqDatetime {
                utc: Some(ts.into()),
                local: None,
            }),
        }
    }

    fn sensor(id: i64) -> OpenAqSensor {
        OpenAqSensor {
            id,
            name: format!("sensor {}", id),
            parameter: None,
        }
    }

    fn location(id: i64, sensors: Vec<OpenAqSensor>) -> OpenAqLocation {
        OpenAqLocation {
            id,
            name: format!("Station {}", id),
            coordinates: Some(OpenAqCoordinates {
                latitude: Some(51.0 + id as f64 / 100.0),
                longitude: Some(-114.07),
            }),
            sensors: Some(sensors),
        }
    }

    fn center() -> Coordinates {
        Coordinates::new(51.0447, -114.0719)
    }

    #[tokio::test]
    async fn failed_location_listing_aborts_cycle() {
        let fetcher = Fetcher::new(Arc::new(FakeSource::default()), FetchStrategy::LatestOnly);
        let result = fetcher.fetch_stations(center(), 25_000).await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn failing_sensor_does_not_sink_its_station() {
        let mut source = FakeSource {
            locations: Some(vec![
                location(1, vec![sensor(10), sensor(11)]),
                location(2, vec![sensor(20)]),
                location(3, vec![]),
            ]),
            ..Default::default()
        };
        // sensor 11 and 20 are missing upstream
        source
            .pages
            .insert(10, vec![vec![measurement("pm25", 8.0, "2024-11-02T22:00:00Z")]]);

        let fetcher = Fetcher::new(Arc::new(source), FetchStrategy::LatestOnly);
        let stations = fetcher.fetch_stations(center(), 25_000).await.unwrap();

        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, 1);
        assert_eq!(stations[0].measurements.len(), 1);
        assert_eq!(stations[0].measurements[0].value, 8.0);
    }

    #[tokio::test]
    async fn station_reading_count_is_sum_of_reduced_sensor_sets() {
        let mut source = FakeSource {
            locations: Some(vec![location(1, vec![sensor(10), sensor(11)])]),
            ..Default::default()
        };
        source.pages.insert(
            10,
            vec![vec![
                measurement("pm25", 1.0, "2024-11-02T20:00:00Z"),
                measurement("pm25", 2.0, "2024-11-02T21:00:00Z"),
                measurement("pm10", 3.0, "2024-11-02T21:00:00Z"),
            ]],
        );
        source
            .pages
            .insert(11, vec![vec![measurement("o3", 4.0, "2024-11-02T21:00:00Z")]]);

        let fetcher = Fetcher::new(Arc::new(source), FetchStrategy::LatestOnly);
        let stations = fetcher.fetch_stations(center(), 25_000).await.unwrap();

        let values: Vec<f64> = stations[0].measurements.iter().map(|r| r.value).collect();
        assert_eq!(values, [2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn full_history_pages_until_short_page() {
        let page = |n: usize| -> Vec<OpenAqMeasurement> {
            (0..n)
                .map(|i| measurement("pm25", i as f64, "2024-11-02T21:00:00Z"))
                .collect()
        };
        let mut source = FakeSource::default();
        source.pages.insert(10, vec![page(3), page(3), page(1)]);
        let source = Arc::new(source);

        let fetcher = Fetcher::new(source.clone(), FetchStrategy::FullHistory { page_size: 3 });
        let readings = fetcher.fetch_sensor_readings(&sensor(10)).await;

        assert_eq!(readings.len(), 7);
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].1, MeasurementQuery::Page { page: 3, limit: 3 });
    }

    #[tokio::test]
    async fn full_history_stops_on_empty_page() {
        let full: Vec<_> = (0..2)
            .map(|i| measurement("pm25", i as f64, "2024-11-02T21:00:00Z"))
            .collect();
        let mut source = FakeSource::default();
        // page 2 is absent, so the fake returns an empty page
        source.pages.insert(10, vec![full]);
        let source = Arc::new(source);

        let fetcher = Fetcher::new(source.clone(), FetchStrategy::FullHistory { page_size: 2 });
        let readings = fetcher.fetch_sensor_readings(&sensor(10)).await;

        assert_eq!(readings.len(), 2);
        assert_eq!(source.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn latest_mode_asks_for_one_measurement() {
        let mut source = FakeSource::default();
        source.pages.insert(10, vec![vec![]]);
        let source = Arc::new(source);

        let fetcher = Fetcher::new(source.clone(), FetchStrategy::LatestOnly);
        assert!(fetcher.fetch_sensor_readings(&sensor(10)).await.is_empty());
        assert_eq!(
            source.calls.lock().unwrap().as_slice(),
            &[(10, MeasurementQuery::Latest)]
        );
    }

    #[tokio::test]
    async fn full_history_dumps_raw_measurements_per_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FakeSource::default();
        source.pages.insert(
            42,
            vec![vec![
                measurement("pm25", 5.0, "2024-11-02T21:00:00Z"),
                OpenAqMeasurement::default(),
            ]],
        );

        let fetcher = Fetcher::new(Arc::new(source), FetchStrategy::FullHistory { page_size: 100 })
            .with_dump_dir(dir.path().join("dumps"));
        let readings = fetcher.fetch_sensor_readings(&sensor(42)).await;
        assert_eq!(readings.len(), 1);

        let dumped = std::fs::read_to_string(dir.path().join("dumps").join("42.json")).unwrap();
        let raw: Vec<OpenAqMeasurement> = serde_json::from_str(&dumped).unwrap();
        assert_eq!(raw.len(), 2);
    }

    #[tokio::test]
    async fn latest_mode_writes_no_dump() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FakeSource::default();
        source
            .pages
            .insert(42, vec![vec![measurement("pm25", 5.0, "2024-11-02T21:00:00Z")]]);

        let fetcher = Fetcher::new(Arc::new(source), FetchStrategy::LatestOnly)
            .with_dump_dir(dir.path());
        fetcher.fetch_sensor_readings(&sensor(42)).await;

        assert!(!dir.path().join("42.json").exists());
    }
}
