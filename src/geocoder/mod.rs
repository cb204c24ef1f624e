//! External geocoder fallback.
//!
//! Place strings the lookup table cannot classify are sent to a remote
//! geocoding service. A candidate locality is extracted from the structured
//! response and fed back through the resolver; imprecise results keep the
//! service's bounding box for the spatial fallback.

mod client;
mod extract;

pub use client::BingMapsClient;
pub use extract::{extract_candidate, formatted_tokens};

use serde::Deserialize;
use std::future::Future;

use crate::error::GeocodeError;

/// A remote forward-geocoding service.
pub trait GeocodingService: Send + Sync {
    /// Look up one raw place string. The implementation adds its own
    /// country qualifier.
    fn locate(
        &self,
        place: &str,
    ) -> impl Future<Output = Result<LocationResponse, GeocodeError>> + Send;
}

/// Locations response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResponse {
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub resource_sets: Vec<ResourceSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSet {
    #[serde(default)]
    pub estimated_total: u64,
    #[serde(default)]
    pub resources: Vec<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Location {
    /// `[south, west, north, east]`
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub formatted_address: Option<String>,
}

impl LocationResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    pub fn estimated_total(&self) -> u64 {
        self.resource_sets
            .first()
            .map(|set| set.estimated_total)
            .unwrap_or(0)
    }

    /// Best-ranked location, if the service found any
    pub fn first_location(&self) -> Option<&Location> {
        if self.estimated_total() == 0 {
            return None;
        }
        self.resource_sets
            .first()
            .and_then(|set| set.resources.first())
    }
}
