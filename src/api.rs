use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::models::{Coordinates, OpenAqLocation, OpenAqMeasurement, OpenAqResponse};
use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Which slice of a sensor's measurement history to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementQuery {
    /// Only the most recent measurement.
    Latest,
    /// One numbered page (1-based) of `limit` measurements.
    Page { page: u32, limit: u32 },
}

/// Upstream source of monitoring locations and sensor measurements.
#[async_trait]
pub trait AirQualitySource: Send + Sync {
    async fn locations(&self, center: Coordinates, radius_meters: u32)
        -> Result<Vec<OpenAqLocation>>;

    async fn measurements(
        &self,
        sensor_id: i64,
        query: MeasurementQuery,
    ) -> Result<Vec<OpenAqMeasurement>>;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// OpenAQ v3 client.
///
/// All requests share one semaphore (in-flight cap) and one token bucket
/// (request rate). Transient failures are retried with linear backoff.
pub struct OpenAqProvider {
    client: Client,
    base_url: String,
    api_key: String,
    permits: Semaphore,
    limiter: Option<Arc<DirectLimiter>>,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAqProvider {
    pub fn new(config: &ApiConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        let limiter = NonZeroU32::new(config.requests_per_second)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            permits: Semaphore::new(config.max_concurrent_requests.max(1)),
            limiter,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.get_once(url, query).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay * attempt;
                    warn!(
                        "Request to {} failed ({}), retrying in {}ms ({}/{})",
                        url,
                        e,
                        delay.as_millis(),
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        // The semaphore lives as long as self and is never closed.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        debug!("GET {} {:?}", url, query);
        let response = self
            .client
            .get(url)
            .header("Content-Type", "application/json")
            .header("X-API-Key", &self.api_key)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl AirQualitySource for OpenAqProvider {
    async fn locations(
        &self,
        center: Coordinates,
        radius_meters: u32,
    ) -> Result<Vec<OpenAqLocation>> {
        let url = format!("{}/locations", self.base_url);
        let query = [
            (
                "coordinates",
                format!("{},{}", center.latitude, center.longitude),
            ),
            ("radius", radius_meters.to_string()),
        ];
        let body: OpenAqResponse<OpenAqLocation> = self.get_json(&url, &query).await?;
        Ok(body.results)
    }

    async fn measurements(
        &self,
        sensor_id: i64,
        query: MeasurementQuery,
    ) -> Result<Vec<OpenAqMeasurement>> {
        let url = format!("{}/sensors/{}/measurements", self.base_url, sensor_id);
        let params = match query {
            MeasurementQuery::Latest => {
                vec![("sort", "desc".to_string()), ("limit", "1".to_string())]
            }
            MeasurementQuery::Page { page, limit } => {
                vec![("page", page.to_string()), ("limit", limit.to_string())]
            }
        };
        let body: OpenAqResponse<OpenAqMeasurement> = self.get_json(&url, &params).await?;
        Ok(body.results)
    }
}
