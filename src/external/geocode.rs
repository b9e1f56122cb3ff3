//! Geocoding of free-text addresses.
//!
//! Lookups are best effort: callers treat an error the same as "no match" and
//! keep the request without coordinates.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::request::Coordinates;
use crate::error::{LifelineError, Result};

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `[longitude, latitude]` for `address`, or `None` when nothing matches.
    async fn locate(&self, address: &str) -> Result<Option<Coordinates>>;
}

/// Configuration for [`NominatimGeocoder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NominatimConfig {
    pub base_url: String,
    /// Nominatim's usage policy requires an identifying user agent
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("lifeline/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Geocoder backed by an OpenStreetMap Nominatim server.
#[derive(Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    config: NominatimConfig,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(config: NominatimConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new(NominatimConfig::default())
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[tracing::instrument(skip(self))]
    async fn locate(&self, address: &str) -> Result<Option<Coordinates>> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let places: Vec<NominatimPlace> = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("limit", "1"), ("q", address)])
            .header("User-Agent", self.config.user_agent.as_str())
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LifelineError::Other(anyhow::anyhow!("Geocoding request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| {
                LifelineError::Other(anyhow::anyhow!("Invalid geocoding response: {}", e))
            })?;

        let Some(place) = places.into_iter().next() else {
            tracing::debug!("No geocoding match");
            return Ok(None);
        };
        let longitude = place.lon.parse::<f64>();
        let latitude = place.lat.parse::<f64>();
        match (longitude, latitude) {
            (Ok(longitude), Ok(latitude)) => Ok(Some(Coordinates {
                longitude,
                latitude,
            })),
            _ => Err(LifelineError::Other(anyhow::anyhow!(
                "Unparseable coordinates lat={} lon={}",
                place.lat,
                place.lon
            ))),
        }
    }
}

/// Mock geocoder for testing.
#[derive(Clone, Default)]
pub struct MockGeocoder {
    places: Arc<Mutex<HashMap<String, Coordinates>>>,
    failing: Arc<Mutex<bool>>,
    calls: Arc<AtomicUsize>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `address` (compared case-insensitively) with `coordinates`.
    pub fn add_place(&self, address: &str, coordinates: Coordinates) {
        self.places
            .lock()
            .insert(address.trim().to_lowercase(), coordinates);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn locate(&self, address: &str) -> Result<Option<Coordinates>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock() {
            return Err(LifelineError::Other(anyhow::anyhow!(
                "mock geocoder unavailable"
            )));
        }
        Ok(self
            .places
            .lock()
            .get(&address.trim().to_lowercase())
            .copied())
    }
}
