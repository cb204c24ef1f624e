//! HTTP client for the Bing Maps Locations API.

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{GeocodingService, LocationResponse};
use crate::config::GeocoderConfig;
use crate::error::GeocodeError;

const RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct BingMapsClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    country: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl BingMapsClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        country: impl Into<String>,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Self, GeocodeError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("Locations")?;

        let client = Client::builder()
            .user_agent("locus/0.1 (place resolution)")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            country: country.into(),
            max_attempts: max_attempts.max(1),
            retry_delay: RETRY_DELAY,
        })
    }

    /// Pause between attempts (default two seconds)
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Build a client from config. Returns `None` when the geocoder is
    /// disabled or no API key is set, in which case the fallback is skipped.
    pub fn from_config(config: &GeocoderConfig) -> Result<Option<Self>, GeocodeError> {
        if !config.enabled {
            return Ok(None);
        }
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                warn!(
                    "{} is not set; geocoder fallback disabled",
                    config.api_key_env
                );
                return Ok(None);
            }
        };
        Self::new(
            &config.base_url,
            api_key,
            &config.country,
            Duration::from_secs(config.timeout_secs),
            config.max_attempts,
        )
        .map(Some)
    }

    /// Full request URL for a place, with the country qualifier appended
    pub fn request_url(&self, place: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", &format!("{}, {}", place, self.country))
            .append_pair("maxResults", "1")
            .append_pair("key", &self.api_key);
        url
    }

    async fn request_once(&self, place: &str) -> Result<LocationResponse, GeocodeError> {
        let response = self.client.get(self.request_url(place)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: LocationResponse = serde_json::from_str(&body)?;
        if !parsed.is_success() {
            return Err(GeocodeError::Api {
                status: parsed.status_code,
                message: "unsuccessful status in response body".to_string(),
            });
        }
        Ok(parsed)
    }
}

impl GeocodingService for BingMapsClient {
    async fn locate(&self, place: &str) -> Result<LocationResponse, GeocodeError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.request_once(place).await {
                Ok(response) => {
                    debug!(
                        "Geocoded '{}': {} result(s)",
                        place,
                        response.estimated_total()
                    );
                    return Ok(response);
                }
                // Client errors will not improve on retry
                Err(GeocodeError::Api { status, message }) if (400..500).contains(&status) => {
                    return Err(GeocodeError::Api { status, message });
                }
                Err(e) if attempts < self.max_attempts => {
                    warn!(
                        "Geocoder request for '{}' failed (attempt {}/{}): {}",
                        place, attempts, self.max_attempts, e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
