use tracing::debug;

use super::LocationResponse;
use crate::lookup::AliasMap;
use crate::models::{BoundingBox, GeocodeCandidate, MatchLevel};
use crate::resolver::NameResolver;

/// Comma-separated components of a formatted address
pub fn formatted_tokens(formatted: &str) -> Vec<&str> {
    formatted
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Turn a geocoder response into a candidate locality.
///
/// Returns `None` when the service reported a failure or no results, or the
/// result carries no usable address.
pub fn extract_candidate(
    response: &LocationResponse,
    resolver: &NameResolver<'_>,
    overrides: &AliasMap,
) -> Option<GeocodeCandidate> {
    if !response.is_success() {
        return None;
    }
    let location = response.first_location()?;
    let address = location.address.as_ref()?;

    let tokens = address
        .formatted_address
        .as_deref()
        .map(formatted_tokens)
        .unwrap_or_default();

    let initial = address
        .locality
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .or_else(|| tokens.first().copied())?;

    let mut candidate = initial;
    if !resolver.classify(candidate).is_matched() {
        if let Some(token) = tokens
            .iter()
            .copied()
            .filter(|t| *t != initial)
            .find(|t| resolver.classify(t).is_matched())
        {
            debug!("Address token '{}' replaces '{}'", token, initial);
            candidate = token;
        }
    }

    let renamed = overrides.rename(candidate);
    let (locality, level) = resolver.resolve(renamed);

    let bbox = if level == MatchLevel::Finest {
        None
    } else {
        location
            .bbox
            .as_deref()
            .and_then(BoundingBox::from_slice)
    };

    Some(GeocodeCandidate {
        locality: locality.filter(|_| level.is_matched()),
        level,
        bbox,
    })
}
