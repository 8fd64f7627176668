use crate::error::{Error, Result};
use crate::fetcher::FetchStrategy;
use crate::models::Coordinates;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable that overrides `[api] api_key`.
pub const API_KEY_ENV: &str = "OPENAQ_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub location: LocationConfig,
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub ui: UiConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: u32, // OpenAQ caps this at 25 km
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Latest,
    FullHistory,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub mode: FetchMode,
    pub page_size: u32,
    pub max_concurrent_requests: usize,
    pub requests_per_second: u32, // 0 disables throttling
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub dump_dir: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub raw_ttl_seconds: u64,
    pub interpolated_ttl_seconds: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UiConfig {
    pub default_pollutant: String,
    pub refresh_interval_seconds: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            name: "Calgary".to_string(),
            latitude: 51.0447,
            longitude: -114.0719,
            radius_meters: 25_000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openaq.org/v3".to_string(),
            api_key: String::new(),
            mode: FetchMode::Latest,
            page_size: 100,
            max_concurrent_requests: 8,
            requests_per_second: 10,
            request_timeout_seconds: 15,
            max_retries: 2,
            retry_delay_ms: 500,
            dump_dir: PathBuf::from("sensor_dumps"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("haze_cache.db"),
            raw_ttl_seconds: 24 * 60 * 60,
            interpolated_ttl_seconds: 24 * 60 * 60,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            default_pollutant: "pm25".to_string(),
            refresh_interval_seconds: 300,
        }
    }
}

impl LocationConfig {
    pub fn center(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

impl ApiConfig {
    pub fn strategy(&self) -> FetchStrategy {
        match self.mode {
            FetchMode::Latest => FetchStrategy::LatestOnly,
            FetchMode::FullHistory => FetchStrategy::FullHistory {
                page_size: self.page_size.max(1),
            },
        }
    }

    /// API key from the environment (or `.env`), else from the config file.
    pub fn resolved_api_key(&self) -> String {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| self.api_key.clone())
    }
}

impl CacheConfig {
    pub fn raw_ttl(&self) -> Duration {
        Duration::from_secs(self.raw_ttl_seconds)
    }

    pub fn interpolated_ttl(&self) -> Duration {
        Duration::from_secs(self.interpolated_ttl_seconds)
    }
}

impl Config {
    /// Parses a TOML config; missing sections and keys take their defaults.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads the config file at `path`.
    /// If it doesn't exist, writes a default one there and uses that.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if let Ok(content) = fs::read_to_string(path) {
            match Config::parse(&content) {
                Ok(config) => return config,
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    return Config::default();
                }
            }
        }

        let default_config = Config::default();

        // Save default config to disk for the user to edit later
        match toml::to_string_pretty(&default_config) {
            Ok(toml_string) => {
                if fs::write(path, toml_string).is_err() {
                    warn!("Could not write default {} to disk.", path.display());
                }
            }
            Err(e) => warn!("Could not serialize default config: {}", e),
        }

        info!("Loaded default configuration.");
        default_config
    }
}
