//! Collapses raw sensor readings into per-station records.
//!
//! [`reduce_latest`] keeps the newest reading per pollutant, [`assemble_station`]
//! merges a station's sensors, and [`flatten_stations`] produces the point list
//! consumed by the cache and interpolator.

use crate::models::{OpenAqLocation, PollutionPoint, Reading, Station};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

fn parse_utc(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One reading per distinct `parameter`, keeping the latest by UTC timestamp.
///
/// Output follows the order in which each parameter first appears. Equal
/// timestamps keep the first reading seen. A candidate whose timestamp fails
/// to parse never replaces the incumbent, whereas a parseable one always
/// replaces an unparseable incumbent.
pub fn reduce_latest(readings: Vec<Reading>) -> Vec<Reading> {
    let mut latest: Vec<(Reading, Option<DateTime<Utc>>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for reading in readings {
        let ts = parse_utc(&reading.timestamp_utc);
        match index.get(&reading.parameter) {
            None => {
                index.insert(reading.parameter.clone(), latest.len());
                latest.push((reading, ts));
            }
            Some(&i) => {
                let newer = match (ts, latest[i].1) {
                    (Some(candidate), Some(current)) => candidate > current,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if newer {
                    latest[i] = (reading, ts);
                }
            }
        }
    }

    latest.into_iter().map(|(reading, _)| reading).collect()
}

/// Builds a [`Station`] from its location record and the reduced readings of
/// each sensor, in sensor order.
///
/// Returns `None` when no sensor produced anything, or when the location has
/// no usable coordinates.
pub fn assemble_station(
    location: &OpenAqLocation,
    sensor_readings: Vec<Vec<Reading>>,
) -> Option<Station> {
    let measurements: Vec<Reading> = sensor_readings.into_iter().flatten().collect();
    if measurements.is_empty() {
        debug!("Station {} ({}) has no usable readings", location.id, location.name);
        return None;
    }

    let Some(position) = location.position() else {
        debug!("Station {} ({}) has no coordinates", location.id, location.name);
        return None;
    };

    Some(Station {
        id: location.id,
        name: location.name.clone(),
        lat: position.latitude,
        lon: position.longitude,
        measurements,
    })
}

/// One [`PollutionPoint`] per station reading, preserving order.
pub fn flatten_stations(stations: &[Station]) -> Vec<PollutionPoint> {
    stations
        .iter()
        .flat_map(|station| {
            station.measurements.iter().map(move |reading| PollutionPoint {
                id: Some(station.id),
                name: station.name.clone(),
                lat: station.lat,
                lon: station.lon,
                pollutant: reading.parameter.clone(),
                value: reading.value,
                unit: reading.unit.clone(),
            })
        })
        .collect()
}
