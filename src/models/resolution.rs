//! Resolution outcomes shared by every pipeline stage.

use serde::{Deserialize, Serialize};

/// How precisely a place string resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLevel {
    Unmatched,
    /// Matched a finest-level unit
    Finest,
    /// Matched a unit above the finest level
    Coarser,
}

impl MatchLevel {
    /// Numeric code used in output tables: 0, 1 or 2.
    pub fn code(&self) -> u8 {
        match self {
            MatchLevel::Unmatched => 0,
            MatchLevel::Finest => 1,
            MatchLevel::Coarser => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MatchLevel::Unmatched),
            1 => Some(MatchLevel::Finest),
            2 => Some(MatchLevel::Coarser),
            _ => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        *self != MatchLevel::Unmatched
    }
}

/// Geocoder bounding box in the service's (south, west, north, east) order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Build from a `[south, west, north, east]` slice; any other length is rejected.
    pub fn from_slice(bounds: &[f64]) -> Option<Self> {
        match bounds {
            [s, w, n, e] => Some(Self::new(*s, *w, *n, *e)),
            _ => None,
        }
    }

    /// Vertical (latitude) span in degrees
    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    /// True when every bound is a finite number
    pub fn is_complete(&self) -> bool {
        [self.south, self.west, self.north, self.east]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Output of the geocoder stage for one place string.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeCandidate {
    /// Canonicalized candidate locality, if any
    pub locality: Option<String>,
    pub level: MatchLevel,
    /// Retained only when `level` is not `Finest`
    pub bbox: Option<BoundingBox>,
}

/// Which stage produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMethod {
    Lookup,
    Geocoder,
    Spatial,
    Unresolved,
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionMethod::Lookup => "lookup",
            ResolutionMethod::Geocoder => "geocoder",
            ResolutionMethod::Spatial => "spatial",
            ResolutionMethod::Unresolved => "unresolved",
        };
        f.write_str(s)
    }
}

/// Final resolution of one raw place string.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlace {
    /// Input place string, trimmed
    pub place: String,
    pub locality: Option<String>,
    pub level: MatchLevel,
    pub method: ResolutionMethod,
}

impl ResolvedPlace {
    pub fn unresolved(place: String) -> Self {
        Self {
            place,
            locality: None,
            level: MatchLevel::Unmatched,
            method: ResolutionMethod::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.locality.is_some() && self.level.is_matched()
    }
}
