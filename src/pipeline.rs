//! Batch orchestration of the resolution stages.
//!
//! Every distinct place string becomes a record that moves through
//! [`RecordState`]. Each stage handles all records in its input state before
//! the next stage starts: lookup and spatial scoring run on the rayon pool
//! from a blocking task, geocoder calls run with bounded concurrency on the
//! async runtime.

use futures::stream::{self, StreamExt};
use hashbrown::HashMap;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::ResolverContext;
use crate::geocoder::{extract_candidate, GeocodingService};
use crate::models::{BoundingBox, GeocodeCandidate, MatchLevel, ResolutionMethod, ResolvedPlace};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordState {
    Unresolved,
    GeocodedPending(GeocodeCandidate),
    SpatiallyPending {
        bbox: BoundingBox,
        /// Level-2 geocoder match kept in case the box yields nothing
        coarse: Option<String>,
    },
    Resolved {
        locality: String,
        level: MatchLevel,
        method: ResolutionMethod,
    },
    PermanentlyUnresolved,
}

impl RecordState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordState::Resolved { .. } | RecordState::PermanentlyUnresolved
        )
    }
}

impl From<&ResolvedPlace> for RecordState {
    fn from(place: &ResolvedPlace) -> Self {
        match &place.locality {
            Some(locality) if place.level.is_matched() => RecordState::Resolved {
                locality: locality.clone(),
                level: place.level,
                method: place.method,
            },
            _ => RecordState::PermanentlyUnresolved,
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    place: String,
    state: RecordState,
}

impl Record {
    fn finish(self) -> ResolvedPlace {
        match self.state {
            RecordState::Resolved {
                locality,
                level,
                method,
            } => ResolvedPlace {
                place: self.place,
                locality: Some(locality),
                level,
                method,
            },
            _ => ResolvedPlace::unresolved(self.place),
        }
    }
}

/// Outcome counts of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub total: usize,
    pub known: usize,
    pub lookup: usize,
    pub geocoder: usize,
    pub spatial: usize,
    pub unresolved: usize,
    pub geocode_requests: usize,
    pub geocode_errors: usize,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} places: {} known, {} lookup, {} geocoder, {} spatial, {} unresolved ({} geocoder requests, {} failed)",
            self.total,
            self.known,
            self.lookup,
            self.geocoder,
            self.spatial,
            self.unresolved,
            self.geocode_requests,
            self.geocode_errors
        )
    }
}

pub struct ResolutionPipeline<G> {
    context: Arc<ResolverContext>,
    geocoder: Option<G>,
    concurrency: usize,
    known: HashMap<String, ResolvedPlace>,
    progress: Option<ProgressBar>,
}

impl<G: GeocodingService> ResolutionPipeline<G> {
    pub fn new(context: Arc<ResolverContext>, geocoder: Option<G>) -> Self {
        Self {
            context,
            geocoder,
            concurrency: 8,
            known: HashMap::new(),
            progress: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Seed with places resolved in an earlier run; they are not re-resolved.
    pub fn with_known<I>(mut self, known: I) -> Self
    where
        I: IntoIterator<Item = ResolvedPlace>,
    {
        for place in known {
            let key = place.place.trim().to_string();
            self.known.insert(key, place);
        }
        self
    }

    /// Progress bar advanced once per geocoder request
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Resolve a batch of place strings.
    ///
    /// Inputs are trimmed and deduplicated; the output has one entry per
    /// distinct trimmed string, sorted by place. Per-record failures end in
    /// an unresolved entry and never abort the batch.
    pub async fn run<I, S>(&self, places: I) -> (Vec<ResolvedPlace>, PipelineStats)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> = places
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .collect();

        let mut stats = PipelineStats {
            total: distinct.len(),
            ..PipelineStats::default()
        };

        let records: Vec<Record> = distinct
            .into_iter()
            .map(|place| {
                let state = match self.known.get(&place) {
                    Some(known) => {
                        stats.known += 1;
                        RecordState::from(known)
                    }
                    None if place.is_empty() => RecordState::PermanentlyUnresolved,
                    None => RecordState::Unresolved,
                };
                Record { place, state }
            })
            .collect();

        let mut records = on_blocking_pool(&self.context, records, lookup_stage).await;
        self.geocode_stage(&mut records, &mut stats).await;
        self.classify_stage(&mut records);
        let records = on_blocking_pool(&self.context, records, spatial_stage).await;

        let resolved: Vec<ResolvedPlace> = records
            .into_iter()
            .map(|record| {
                debug_assert!(record.state.is_terminal());
                record.finish()
            })
            .collect();

        for place in resolved.iter().filter(|p| !self.known.contains_key(&p.place)) {
            match place.method {
                ResolutionMethod::Lookup => stats.lookup += 1,
                ResolutionMethod::Geocoder => stats.geocoder += 1,
                ResolutionMethod::Spatial => stats.spatial += 1,
                ResolutionMethod::Unresolved => stats.unresolved += 1,
            }
        }

        info!("Resolution finished: {}", stats);
        (resolved, stats)
    }

    /// Unresolved → GeocodedPending | PermanentlyUnresolved
    async fn geocode_stage(&self, records: &mut [Record], stats: &mut PipelineStats) {
        let pending: Vec<(usize, String)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == RecordState::Unresolved)
            .map(|(i, r)| (i, r.place.clone()))
            .collect();

        let Some(geocoder) = self.geocoder.as_ref() else {
            if !pending.is_empty() {
                info!(
                    "No geocoder configured; {} places stay unresolved",
                    pending.len()
                );
            }
            for (i, _) in pending {
                records[i].state = RecordState::PermanentlyUnresolved;
            }
            return;
        };

        if pending.is_empty() {
            return;
        }
        info!(
            "Geocoding {} places ({} concurrent requests)",
            pending.len(),
            self.concurrency
        );
        if let Some(pb) = &self.progress {
            pb.set_length(pending.len() as u64);
        }
        stats.geocode_requests += pending.len();

        let responses: Vec<_> = stream::iter(pending)
            .map(|(i, place)| async move {
                let result = geocoder.locate(&place).await;
                (i, result)
            })
            .buffer_unordered(self.concurrency)
            .inspect(|_| {
                if let Some(pb) = &self.progress {
                    pb.inc(1);
                }
            })
            .collect()
            .await;

        let resolver = self.context.resolver();
        let overrides = self.context.geocoder_overrides();
        for (i, result) in responses {
            let record = &mut records[i];
            record.state = match result {
                Ok(response) => match extract_candidate(&response, &resolver, overrides) {
                    Some(candidate) => {
                        debug!("'{}' geocoded to {:?}", record.place, candidate);
                        RecordState::GeocodedPending(candidate)
                    }
                    None => {
                        debug!("No geocoder result for '{}'", record.place);
                        RecordState::PermanentlyUnresolved
                    }
                },
                Err(e) => {
                    warn!("Geocoding '{}' failed: {}", record.place, e);
                    stats.geocode_errors += 1;
                    RecordState::PermanentlyUnresolved
                }
            };
        }

        if let Some(pb) = &self.progress {
            pb.finish_with_message("geocoding done");
        }
    }

    /// GeocodedPending → Resolved | SpatiallyPending | PermanentlyUnresolved
    fn classify_stage(&self, records: &mut [Record]) {
        for record in records.iter_mut() {
            let RecordState::GeocodedPending(candidate) = &record.state else {
                continue;
            };
            let candidate = candidate.clone();
            record.state = match (candidate.level, candidate.locality, candidate.bbox) {
                (MatchLevel::Finest, Some(locality), _) => RecordState::Resolved {
                    locality,
                    level: MatchLevel::Finest,
                    method: ResolutionMethod::Geocoder,
                },
                (level, locality, Some(bbox)) => RecordState::SpatiallyPending {
                    bbox,
                    coarse: locality.filter(|_| level == MatchLevel::Coarser),
                },
                (MatchLevel::Coarser, Some(locality), None) => RecordState::Resolved {
                    locality,
                    level: MatchLevel::Coarser,
                    method: ResolutionMethod::Geocoder,
                },
                _ => RecordState::PermanentlyUnresolved,
            };
        }
    }
}

/// Run a rayon stage on tokio's blocking pool so async workers stay free
async fn on_blocking_pool<F>(
    context: &Arc<ResolverContext>,
    mut records: Vec<Record>,
    stage: F,
) -> Vec<Record>
where
    F: FnOnce(&ResolverContext, &mut [Record]) + Send + 'static,
{
    let context = Arc::clone(context);
    tokio::task::spawn_blocking(move || {
        stage(&context, &mut records);
        records
    })
    .await
    .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))
}

/// Unresolved → Resolved when the string is canonical or a known alias
fn lookup_stage(context: &ResolverContext, records: &mut [Record]) {
    let resolver = context.resolver();
    records
        .par_iter_mut()
        .filter(|r| r.state == RecordState::Unresolved)
        .for_each(|record| {
            if let (Some(locality), level) = resolver.resolve(&record.place) {
                if level.is_matched() {
                    record.state = RecordState::Resolved {
                        locality,
                        level,
                        method: ResolutionMethod::Lookup,
                    };
                }
            }
        });
}

/// SpatiallyPending → Resolved | PermanentlyUnresolved
fn spatial_stage(context: &ResolverContext, records: &mut [Record]) {
    let resolver = context.resolver();
    let matcher = context.spatial();
    records.par_iter_mut().for_each(|record| {
        let RecordState::SpatiallyPending { bbox, coarse } = &record.state else {
            return;
        };
        let (bbox, coarse) = (*bbox, coarse.clone());

        let spatial = matcher
            .intersection_over_union(&bbox)
            .map(|name| resolver.resolve(&name))
            .and_then(|(locality, level)| match locality {
                Some(locality) if level.is_matched() => Some((locality, level)),
                _ => None,
            });

        record.state = match (spatial, coarse) {
            (Some((locality, level)), _) => {
                debug!("'{}' matched spatially to {}", record.place, locality);
                RecordState::Resolved {
                    locality,
                    level,
                    method: ResolutionMethod::Spatial,
                }
            }
            (None, Some(locality)) => RecordState::Resolved {
                locality,
                level: MatchLevel::Coarser,
                method: ResolutionMethod::Geocoder,
            },
            (None, None) => RecordState::PermanentlyUnresolved,
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::sample_context;
    use crate::error::GeocodeError;
    use crate::geocoder::{Address, Location, LocationResponse, ResourceSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory geocoder keyed by place string
    #[derive(Default)]
    struct FakeGeocoder {
        responses: HashMap<String, LocationResponse>,
        calls: AtomicUsize,
    }

    impl FakeGeocoder {
        fn with(mut self, place: &str, locality: Option<&str>, formatted: &str, bbox: Option<[f64; 4]>) -> Self {
            self.responses.insert(
                place.to_string(),
                LocationResponse {
                    status_code: 200,
                    resource_sets: vec![ResourceSet {
                        estimated_total: 1,
                        resources: vec![Location {
                            bbox: bbox.map(|b| b.to_vec()),
                            address: Some(Address {
                                locality: locality.map(str::to_string),
                                formatted_address: Some(formatted.to_string()),
                            }),
                        }],
                    }],
                },
            );
            self
        }
    }

    impl GeocodingService for FakeGeocoder {
        async fn locate(&self, place: &str) -> Result<LocationResponse, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(place) {
                Some(response) => Ok(response.clone()),
                None if place == "Server Down" => Err(GeocodeError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                }),
                None => Ok(LocationResponse {
                    status_code: 200,
                    resource_sets: vec![ResourceSet::default()],
                }),
            }
        }
    }

    fn by_place(resolved: &[ResolvedPlace], place: &str) -> ResolvedPlace {
        resolved.iter().find(|p| p.place == place).cloned().unwrap()
    }

    #[tokio::test]
    async fn test_lookup_only_without_geocoder() {
        let pipeline: ResolutionPipeline<FakeGeocoder> =
            ResolutionPipeline::new(Arc::new(sample_context()), None);
        let (resolved, stats) = pipeline
            .run(["  Dundee ", "Dundee", "Scotland", "Atlantis", "   "])
            .await;

        assert_eq!(resolved.len(), 4);
        let dundee = by_place(&resolved, "Dundee");
        assert_eq!(dundee.locality.as_deref(), Some("Dundee City"));
        assert_eq!(dundee.method, ResolutionMethod::Lookup);
        assert_eq!(by_place(&resolved, "Scotland").level, MatchLevel::Coarser);
        assert!(!by_place(&resolved, "Atlantis").is_resolved());
        assert!(!by_place(&resolved, "").is_resolved());
        assert_eq!(stats.lookup, 2);
        assert_eq!(stats.unresolved, 2);
        assert_eq!(stats.geocode_requests, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_as_a_spawned_task() {
        let geocoder = FakeGeocoder::default().with(
            "Filton Airfield",
            Some("Filton"),
            "Filton, United Kingdom",
            Some([0.2, 0.9, 0.6, 1.4]),
        );
        let pipeline = Arc::new(ResolutionPipeline::new(Arc::new(sample_context()), Some(geocoder)));

        let task = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.run(["Dundee", "Filton Airfield", "Atlantis"]).await }
        });
        let (resolved, stats) = task.await.unwrap();

        assert_eq!(by_place(&resolved, "Dundee").method, ResolutionMethod::Lookup);
        let filton = by_place(&resolved, "Filton Airfield");
        assert_eq!(filton.locality.as_deref(), Some("South Gloucestershire"));
        assert_eq!(filton.method, ResolutionMethod::Spatial);
        assert_eq!(stats.unresolved, 1);
    }

    #[tokio::test]
    async fn test_geocoder_and_spatial_fallbacks() {
        let geocoder = FakeGeocoder::default()
            .with("Clifton Village", Some("Clifton"), "Clifton, Bristol, United Kingdom", None)
            // Unknown locality; the box sits 80% inside South Gloucestershire
            .with("Filton Airfield", Some("Filton"), "Filton, United Kingdom", Some([0.2, 0.9, 0.6, 1.4]))
            // Coarse match whose box straddles two districts evenly
            .with("Somewhere South West", None, "South West, United Kingdom", Some([0.0, 0.5, 1.0, 1.5]))
            .with("Middle Of Nowhere", None, "Nowhere, United Kingdom", Some([5.0, 5.0, 5.5, 5.5]));

        let pipeline = ResolutionPipeline::new(Arc::new(sample_context()), Some(geocoder))
            .with_concurrency(2);
        let (resolved, stats) = pipeline
            .run([
                "Clifton Village",
                "Filton Airfield",
                "Somewhere South West",
                "Middle Of Nowhere",
                "Unknown Place",
                "Server Down",
                "Hove",
            ])
            .await;

        let clifton = by_place(&resolved, "Clifton Village");
        assert_eq!(clifton.locality.as_deref(), Some("Bristol, City of"));
        assert_eq!(clifton.method, ResolutionMethod::Geocoder);

        let filton = by_place(&resolved, "Filton Airfield");
        assert_eq!(filton.locality.as_deref(), Some("South Gloucestershire"));
        assert_eq!(filton.level, MatchLevel::Finest);
        assert_eq!(filton.method, ResolutionMethod::Spatial);

        let south_west = by_place(&resolved, "Somewhere South West");
        assert_eq!(south_west.locality.as_deref(), Some("South West"));
        assert_eq!(south_west.level, MatchLevel::Coarser);
        assert_eq!(south_west.method, ResolutionMethod::Geocoder);

        assert!(!by_place(&resolved, "Middle Of Nowhere").is_resolved());
        assert!(!by_place(&resolved, "Unknown Place").is_resolved());
        assert!(!by_place(&resolved, "Server Down").is_resolved());
        assert_eq!(by_place(&resolved, "Hove").method, ResolutionMethod::Lookup);

        // Hove never reaches the geocoder
        assert_eq!(stats.geocode_requests, 6);
        assert_eq!(stats.geocode_errors, 1);
        assert_eq!(pipeline.geocoder.as_ref().unwrap().calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_known_places_are_not_resolved_again() {
        let geocoder = FakeGeocoder::default();
        let known = vec![ResolvedPlace {
            place: "Brizzle Harbourside".to_string(),
            locality: Some("Bristol, City of".to_string()),
            level: MatchLevel::Finest,
            method: ResolutionMethod::Geocoder,
        }];
        let pipeline = ResolutionPipeline::new(Arc::new(sample_context()), Some(geocoder))
            .with_known(known);

        let (resolved, stats) = pipeline.run(["Brizzle Harbourside"]).await;
        assert_eq!(
            resolved[0].locality.as_deref(),
            Some("Bristol, City of")
        );
        assert_eq!(resolved[0].method, ResolutionMethod::Geocoder);
        assert_eq!(stats.known, 1);
        assert_eq!(stats.geocoder, 0);
        assert_eq!(stats.geocode_requests, 0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(RecordState::PermanentlyUnresolved.is_terminal());
        assert!(!RecordState::Unresolved.is_terminal());
        assert!(!RecordState::SpatiallyPending {
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            coarse: None
        }
        .is_terminal());
    }
}
