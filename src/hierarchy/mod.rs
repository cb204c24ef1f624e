//! Static reference data: administrative units, their nesting and boundaries.
//!
//! The hierarchy is loaded once at startup and shared read-only by every
//! resolver call afterwards.

mod boundary;
mod loader;

pub use boundary::{load_boundaries, AdminBoundary};
pub use loader::{load_hierarchy, load_subdivisions, open_table};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ReferenceDataError;
use crate::models::AdminLevel;

/// Immutable national hierarchy.
#[derive(Debug, Default)]
pub struct AdministrativeHierarchy {
    names: BTreeMap<AdminLevel, BTreeSet<String>>,
    /// Finest-level name -> its parent at each coarser level
    parents: BTreeMap<String, BTreeMap<AdminLevel, String>>,
    /// (subdivision name, finest-level parent) in source order
    subdivisions: Vec<(String, String)>,
    boundaries: Vec<Arc<AdminBoundary>>,
}

impl AdministrativeHierarchy {
    pub fn builder() -> HierarchyBuilder {
        HierarchyBuilder::default()
    }

    /// Is `name` a canonical unit at `level`?
    pub fn contains(&self, name: &str, level: AdminLevel) -> bool {
        self.names
            .get(&level)
            .map(|set| set.contains(name))
            .unwrap_or(false)
    }

    /// Finest level at which `name` is canonical
    pub fn level_of(&self, name: &str) -> Option<AdminLevel> {
        AdminLevel::all()
            .iter()
            .copied()
            .find(|level| self.contains(name, *level))
    }

    pub fn is_canonical(&self, name: &str) -> bool {
        self.level_of(name).is_some()
    }

    /// Canonical names at one level, sorted
    pub fn names(&self, level: AdminLevel) -> impl Iterator<Item = &str> {
        self.names
            .get(&level)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Parent of a finest-level unit at a coarser level
    pub fn ancestor(&self, name: &str, level: AdminLevel) -> Option<&str> {
        if level.is_finest() {
            return self
                .names
                .get(&AdminLevel::Lad)
                .and_then(|set| set.get(name))
                .map(String::as_str);
        }
        self.parents
            .get(name)
            .and_then(|p| p.get(&level))
            .map(String::as_str)
    }

    pub fn subdivisions(&self) -> &[(String, String)] {
        &self.subdivisions
    }

    pub fn boundaries(&self) -> &[Arc<AdminBoundary>] {
        &self.boundaries
    }

    pub fn len(&self, level: AdminLevel) -> usize {
        self.names.get(&level).map(BTreeSet::len).unwrap_or(0)
    }
}

/// Accumulates reference rows before freezing them into a hierarchy.
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    inner: AdministrativeHierarchy,
}

impl HierarchyBuilder {
    /// Register a finest-level unit with its parents at coarser levels
    pub fn add_unit<I, S>(&mut self, name: &str, parents: I) -> &mut Self
    where
        I: IntoIterator<Item = (AdminLevel, S)>,
        S: Into<String>,
    {
        let name = name.trim();
        if name.is_empty() {
            return self;
        }
        self.inner
            .names
            .entry(AdminLevel::Lad)
            .or_default()
            .insert(name.to_string());

        for (level, parent) in parents {
            let parent: String = parent.into();
            let parent = parent.trim();
            if parent.is_empty() || level.is_finest() {
                continue;
            }
            self.inner
                .names
                .entry(level)
                .or_default()
                .insert(parent.to_string());
            self.inner
                .parents
                .entry(name.to_string())
                .or_default()
                .insert(level, parent.to_string());
        }
        self
    }

    /// Register a fine-grained subdivision (e.g. an electoral ward)
    pub fn add_subdivision(&mut self, name: &str, parent: &str) -> &mut Self {
        let (name, parent) = (name.trim(), parent.trim());
        if !name.is_empty() && !parent.is_empty() {
            self.inner
                .subdivisions
                .push((name.to_string(), parent.to_string()));
        }
        self
    }

    pub fn add_boundary(&mut self, boundary: AdminBoundary) -> &mut Self {
        self.inner.boundaries.push(Arc::new(boundary));
        self
    }

    /// Validate cross references and freeze the hierarchy
    pub fn build(self) -> Result<AdministrativeHierarchy, ReferenceDataError> {
        let mut hierarchy = self.inner;

        if hierarchy.len(AdminLevel::Lad) == 0 {
            return Err(ReferenceDataError::Empty);
        }

        let before = hierarchy.subdivisions.len();
        let names = &hierarchy.names;
        hierarchy.subdivisions.retain(|(sub, parent)| {
            let known = names
                .get(&AdminLevel::Lad)
                .map(|set| set.contains(parent))
                .unwrap_or(false);
            if !known {
                warn!("Skipping subdivision '{}': unknown parent '{}'", sub, parent);
            }
            known
        });

        hierarchy.boundaries.retain(|b| {
            let known = names
                .get(&AdminLevel::Lad)
                .map(|set| set.contains(&b.unit.name))
                .unwrap_or(false);
            if !known {
                warn!("Skipping boundary for unknown unit '{}'", b.unit.name);
            }
            known
        });

        let with_geometry: BTreeSet<&str> = hierarchy
            .boundaries
            .iter()
            .map(|b| b.unit.name.as_str())
            .collect();
        let missing = hierarchy
            .names(AdminLevel::Lad)
            .filter(|n| !with_geometry.contains(n))
            .count();
        if missing > 0 && !hierarchy.boundaries.is_empty() {
            warn!("{} finest-level units have no boundary geometry", missing);
        }

        info!(
            "Hierarchy ready: {} subdivisions dropped, {} boundaries",
            before - hierarchy.subdivisions.len(),
            hierarchy.boundaries.len()
        );
        for level in AdminLevel::all() {
            info!("  {:?}: {} units", level, hierarchy.len(*level));
        }

        Ok(hierarchy)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    /// Small synthetic hierarchy shared by tests across the crate.
    ///
    /// Districts tile a 3x1 strip of unit squares: Bristol [0,1], South
    /// Gloucestershire [1,2] and "Brighton and Hove" [2,3].
    pub(crate) fn sample_hierarchy() -> AdministrativeHierarchy {
        let mut b = AdministrativeHierarchy::builder();
        b.add_unit(
            "Bristol, City of",
            [
                (AdminLevel::Itl3, "Bristol, City of"),
                (AdminLevel::Itl2, "Gloucestershire, Wiltshire and Bristol/Bath area"),
                (AdminLevel::Itl1, "South West"),
            ],
        );
        b.add_unit(
            "South Gloucestershire",
            [
                (AdminLevel::Itl3, "Bath and North East Somerset, North Somerset and South Gloucestershire"),
                (AdminLevel::Itl2, "Gloucestershire, Wiltshire and Bristol/Bath area"),
                (AdminLevel::Itl1, "South West"),
            ],
        );
        b.add_unit(
            "Brighton and Hove",
            [
                (AdminLevel::Itl3, "Brighton and Hove"),
                (AdminLevel::Itl2, "Surrey, East and West Sussex"),
                (AdminLevel::Itl1, "South East"),
            ],
        );
        b.add_unit(
            "Dundee City",
            [
                (AdminLevel::Itl3, "Angus and Dundee City"),
                (AdminLevel::Itl2, "Eastern Scotland"),
                (AdminLevel::Itl1, "Scotland"),
            ],
        );
        b.add_subdivision("Clifton Down", "Bristol, City of");
        b.add_subdivision("Bradley Stoke North and Stoke Gifford", "South Gloucestershire");
        b.add_subdivision("Orphan Ward", "Nowhere");

        for (i, name) in ["Bristol, City of", "South Gloucestershire", "Brighton and Hove"]
            .iter()
            .enumerate()
        {
            let x = i as f64;
            b.add_boundary(AdminBoundary::new(
                name,
                MultiPolygon::new(vec![polygon![
                    (x: x, y: 0.0),
                    (x: x + 1.0, y: 0.0),
                    (x: x + 1.0, y: 1.0),
                    (x: x, y: 1.0),
                    (x: x, y: 0.0),
                ]]),
            ));
        }
        b.build().unwrap()
    }

    #[test]
    fn test_levels_and_membership() {
        let h = sample_hierarchy();
        assert_eq!(h.level_of("Dundee City"), Some(AdminLevel::Lad));
        assert_eq!(h.level_of("Scotland"), Some(AdminLevel::Itl1));
        // Same name at two levels resolves to the finest one
        assert_eq!(h.level_of("Bristol, City of"), Some(AdminLevel::Lad));
        assert_eq!(h.level_of("Atlantis"), None);
        assert_eq!(h.len(AdminLevel::Lad), 4);
    }

    #[test]
    fn test_ancestor_lookup() {
        let h = sample_hierarchy();
        assert_eq!(h.ancestor("Dundee City", AdminLevel::Itl1), Some("Scotland"));
        assert_eq!(h.ancestor("Dundee City", AdminLevel::Lad), Some("Dundee City"));
        assert_eq!(h.ancestor("Scotland", AdminLevel::Itl1), None);
    }

    #[test]
    fn test_unknown_subdivision_parent_is_dropped() {
        let h = sample_hierarchy();
        assert_eq!(h.subdivisions().len(), 2);
        assert!(h.subdivisions().iter().all(|(_, p)| p != "Nowhere"));
    }

    #[test]
    fn test_empty_hierarchy_is_rejected() {
        let b = AdministrativeHierarchy::builder();
        assert!(matches!(b.build(), Err(ReferenceDataError::Empty)));
    }
}
