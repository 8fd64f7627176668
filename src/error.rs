//! Unified error type for the haze pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The station listing could not be retrieved; the whole cycle is lost.
    #[error("Upstream air quality API unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A single sensor could not be read. Recovered by the fetcher.
    #[error("Sensor {sensor_id} fetch failed: {reason}")]
    SensorFetchFailed { sensor_id: i64, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a retry could plausibly succeed (timeouts, throttling, 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
