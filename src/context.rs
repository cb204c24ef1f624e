//! The immutable reference context every resolution call runs against.

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{Config, ReferenceConfig, Thresholds};
use crate::error::LookupError;
use crate::hierarchy::{self, AdministrativeHierarchy, HierarchyBuilder};
use crate::lookup::{AliasMap, NameLookupTable};
use crate::resolver::NameResolver;
use crate::spatial::SpatialMatcher;

/// The tier table alone, without subdivisions or boundary geometry.
///
/// Enough for rolling resolved districts up to a coarser level.
pub fn load_tiers(reference: &ReferenceConfig) -> Result<AdministrativeHierarchy> {
    tier_builder(reference)?
        .build()
        .context("Invalid hierarchy")
}

fn tier_builder(reference: &ReferenceConfig) -> Result<HierarchyBuilder> {
    let mut builder = AdministrativeHierarchy::builder();
    hierarchy::load_hierarchy(
        &mut builder,
        &reference.hierarchy_csv,
        &reference.finest_column,
        &reference.coarser_columns,
    )
    .context("Failed to load hierarchy")?;
    Ok(builder)
}

/// Hierarchy, lookup table, geocoder overrides and spatial index.
///
/// Built once before any resolution starts and never mutated afterwards;
/// share it behind an `Arc`.
pub struct ResolverContext {
    hierarchy: AdministrativeHierarchy,
    lookup: NameLookupTable,
    geocoder_overrides: AliasMap,
    spatial: SpatialMatcher,
}

impl ResolverContext {
    pub fn new(
        hierarchy: AdministrativeHierarchy,
        manual_aliases: &AliasMap,
        geocoder_overrides: AliasMap,
        thresholds: &Thresholds,
    ) -> Result<Self, LookupError> {
        let lookup = NameLookupTable::build(&hierarchy, manual_aliases)?;
        let spatial = SpatialMatcher::from_hierarchy(
            &hierarchy,
            thresholds.min_overlap,
            thresholds.max_lat_span,
        );
        Ok(Self {
            hierarchy,
            lookup,
            geocoder_overrides,
            spatial,
        })
    }

    /// Load all reference data named in the config. Any failure here is fatal.
    pub fn load(config: &Config) -> Result<Self> {
        let reference = &config.reference;
        let mut builder = tier_builder(reference)?;

        if let Some(path) = &reference.subdivisions_csv {
            hierarchy::load_subdivisions(
                &mut builder,
                path,
                &reference.subdivision_column,
                &reference.subdivision_parent_column,
            )
            .context("Failed to load subdivisions")?;
        }

        if let Some(path) = &reference.boundaries_geojson {
            hierarchy::load_boundaries(&mut builder, path, &reference.boundary_name_property)
                .context("Failed to load boundaries")?;
        }

        let hierarchy = builder.build().context("Invalid hierarchy")?;
        let manual = AliasMap::load(&config.aliases.manual)?;
        let overrides = AliasMap::load(&config.aliases.geocoder_overrides)?;

        let ctx = Self::new(hierarchy, &manual, overrides, &config.thresholds)
            .context("Failed to build lookup table")?;
        info!(
            "Reference context ready: {} aliases, {} geocoder overrides, {} indexed boundaries",
            ctx.lookup.len(),
            ctx.geocoder_overrides.len(),
            ctx.spatial.index().len()
        );
        Ok(ctx)
    }

    pub fn resolver(&self) -> NameResolver<'_> {
        NameResolver::new(&self.hierarchy, &self.lookup)
    }

    pub fn geocoder_overrides(&self) -> &AliasMap {
        &self.geocoder_overrides
    }

    pub fn spatial(&self) -> &SpatialMatcher {
        &self.spatial
    }
}
