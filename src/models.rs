use serde::{Deserialize, Serialize};

/// A geographic point in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

// --- OpenAQ v3 wire types ---
// Decoding is lenient: anything the pipeline can live without is optional.

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAqResponse<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAqLocation {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub coordinates: Option<OpenAqCoordinates>,
    #[serde(default)]
    pub sensors: Option<Vec<OpenAqSensor>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAqCoordinates {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl OpenAqLocation {
    /// The location's coordinates, if both are present and finite.
    pub fn position(&self) -> Option<Coordinates> {
        let coords = self.coordinates.as_ref()?;
        match (coords.latitude, coords.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Some(Coordinates::new(lat, lon))
            }
            _ => None,
        }
    }

    pub fn sensors(&self) -> &[OpenAqSensor] {
        self.sensors.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAqSensor {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parameter: Option<OpenAqParameter>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAqParameter {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub units: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAqDatetime {
    #[serde(default)]
    pub utc: Option<String>,
    #[serde(default)]
    pub local: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAqPeriod {
    #[serde(default)]
    pub datetime_from: Option<OpenAqDatetime>,
    #[serde(default)]
    pub datetime_to: Option<OpenAqDatetime>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAqMeasurement {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub parameter: Option<OpenAqParameter>,
    #[serde(default)]
    pub period: Option<OpenAqPeriod>,
    #[serde(default)]
    pub date: Option<OpenAqDatetime>,
}

impl OpenAqMeasurement {
    /// UTC timestamp of the reading: end of the averaging period, falling
    /// back to its start, then to the older `date` field. Empty if absent.
    pub fn timestamp_utc(&self) -> String {
        let period = self.period.as_ref();
        period
            .and_then(|p| p.datetime_to.as_ref())
            .and_then(|d| d.utc.clone())
            .or_else(|| {
                period
                    .and_then(|p| p.datetime_from.as_ref())
                    .and_then(|d| d.utc.clone())
            })
            .or_else(|| self.date.as_ref().and_then(|d| d.utc.clone()))
            .unwrap_or_default()
    }

    /// Converts to a [`Reading`], using the sensor's own parameter when the
    /// measurement doesn't carry one. Unusable measurements yield `None`.
    pub fn to_reading(&self, sensor_parameter: Option<&OpenAqParameter>) -> Option<Reading> {
        let value = self.value.filter(|v| v.is_finite())?;
        let parameter = self.parameter.as_ref().or(sensor_parameter)?;
        if parameter.name.is_empty() || parameter.units.is_empty() {
            return None;
        }

        Some(Reading {
            parameter: parameter.name.clone(),
            value,
            unit: parameter.units.clone(),
            timestamp_utc: self.timestamp_utc(),
        })
    }
}

// --- Domain types ---

/// One timestamped pollutant measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub parameter: String,
    pub value: f64,
    pub unit: String,
    pub timestamp_utc: String,
}

/// A monitoring location with the latest reading per pollutant per sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub measurements: Vec<Reading>,
}

/// Flattened (station, pollutant) value, the unit of caching and interpolation.
///
/// Real points carry the station `id`; synthetic points produced by
/// [`interpolate`](crate::interpolate::interpolate) have none, and the key is
/// left out of their JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutionPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub pollutant: String,
    pub value: f64,
    pub unit: String,
}

impl PollutionPoint {
    pub fn is_interpolated(&self) -> bool {
        self.id.is_none()
    }
}

/// Canonical form for comparing pollutant codes: `pm2.5` and `PM25` match.
pub fn normalize_pollutant(code: &str) -> String {
    code.to_uppercase().replace('.', "")
}
