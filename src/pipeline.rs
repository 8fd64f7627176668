use crate::api::{AirQualitySource, OpenAqProvider};
use crate::cache::{Cache, Slot, INTERPOLATED_KEY, RAW_KEY};
use crate::config::Config;
use crate::db::{KvStore, SqliteStore};
use crate::error::{Error, Result};
use crate::fetcher::{FetchStrategy, Fetcher};
use crate::interpolate::interpolate;
use crate::models::{Coordinates, PollutionPoint, Station};
use crate::reduce::flatten_stations;
use std::sync::Arc;
use tracing::{info, warn};

/// Fetch → reduce → cache → interpolate, for one configured area.
pub struct PollutionService<S, K> {
    fetcher: Fetcher<S>,
    cache: Cache<K>,
    center: Coordinates,
    radius_meters: u32,
    raw_slot: Slot,
    interpolated_slot: Slot,
}

impl PollutionService<OpenAqProvider, SqliteStore> {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api.resolved_api_key();
        if api_key.is_empty() {
            warn!("No OpenAQ API key configured; requests will likely be rejected");
        }

        let provider = OpenAqProvider::new(&config.api, api_key)?;
        let mut fetcher = Fetcher::new(Arc::new(provider), config.api.strategy());
        if let FetchStrategy::FullHistory { .. } = fetcher.strategy() {
            fetcher = fetcher.with_dump_dir(&config.api.dump_dir);
        }

        let store = SqliteStore::open(&config.cache.path)?;
        info!("Cache database at {}", config.cache.path.display());

        Ok(Self::new(fetcher, Cache::new(Arc::new(store)), config))
    }
}

impl<S: AirQualitySource, K: KvStore> PollutionService<S, K> {
    pub fn new(fetcher: Fetcher<S>, cache: Cache<K>, config: &Config) -> Self {
        if config.location.radius_meters == 0 {
            warn!("Search radius is 0m; no stations will be found");
        }
        Self {
            fetcher,
            cache,
            center: config.location.center(),
            radius_meters: config.location.radius_meters,
            raw_slot: Slot::new(RAW_KEY, config.cache.raw_ttl()),
            interpolated_slot: Slot::new(INTERPOLATED_KEY, config.cache.interpolated_ttl()),
        }
    }

    /// Live station list, bypassing the cache.
    pub async fn stations(&self) -> Result<Vec<Station>> {
        self.fetcher.fetch_stations(self.center, self.radius_meters).await
    }

    /// Real plus interpolated points, served from cache while fresh.
    pub async fn points(&self) -> Result<Vec<PollutionPoint>> {
        self.cache
            .get_or_fetch_derived(
                &self.raw_slot,
                &self.interpolated_slot,
                || async {
                    let stations = self.stations().await?;
                    Ok::<_, Error>(flatten_stations(&stations))
                },
                |raw: &Vec<PollutionPoint>| interpolate(raw),
            )
            .await
    }

    /// Refetches upstream regardless of freshness and rewrites both slots.
    pub async fn refresh(&self) -> Result<Vec<PollutionPoint>> {
        let raw = flatten_stations(&self.stations().await?);
        let points = interpolate(&raw);
        self.cache.put(&self.raw_slot, &raw);
        self.cache.put(&self.interpolated_slot, &points);
        Ok(points)
    }
}
