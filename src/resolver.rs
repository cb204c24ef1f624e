//! Classification and canonicalization of place strings.

use hashbrown::HashSet;
use tracing::warn;

use crate::error::ResolveError;
use crate::hierarchy::AdministrativeHierarchy;
use crate::lookup::NameLookupTable;
use crate::models::{AdminLevel, MatchLevel};

/// Read-only view over the hierarchy and lookup table.
#[derive(Clone, Copy)]
pub struct NameResolver<'a> {
    hierarchy: &'a AdministrativeHierarchy,
    lookup: &'a NameLookupTable,
}

impl<'a> NameResolver<'a> {
    pub fn new(hierarchy: &'a AdministrativeHierarchy, lookup: &'a NameLookupTable) -> Self {
        Self { hierarchy, lookup }
    }

    fn direct_level(&self, name: &str) -> MatchLevel {
        match self.hierarchy.level_of(name) {
            Some(AdminLevel::Lad) => MatchLevel::Finest,
            Some(_) => MatchLevel::Coarser,
            None => MatchLevel::Unmatched,
        }
    }

    pub fn try_classify(&self, name: &str) -> Result<MatchLevel, ResolveError> {
        let level = self.direct_level(name);
        if level.is_matched() {
            return Ok(level);
        }
        match self.lookup.get(name) {
            Some(_) => Ok(self.direct_level(&self.walk(name)?)),
            None => Ok(MatchLevel::Unmatched),
        }
    }

    /// 1 for finest-level names, 2 for coarser names, aliases classify as
    /// their target, 0 otherwise.
    pub fn classify(&self, name: &str) -> MatchLevel {
        self.try_classify(name).unwrap_or_else(|e| {
            warn!("{}", e);
            MatchLevel::Unmatched
        })
    }

    pub fn try_canonicalize(&self, name: &str) -> Result<Option<String>, ResolveError> {
        if self.lookup.contains(name) {
            return self.walk(name).map(Some);
        }
        Ok(self
            .direct_level(name)
            .is_matched()
            .then(|| name.to_string()))
    }

    /// Alias target if `name` is an alias, `name` itself if it is canonical,
    /// `None` otherwise.
    pub fn canonicalize(&self, name: &str) -> Option<String> {
        self.try_canonicalize(name).unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })
    }

    /// `canonicalize` followed by `classify` of the result
    pub fn resolve(&self, name: &str) -> (Option<String>, MatchLevel) {
        match self.canonicalize(name) {
            Some(canonical) => {
                let level = self.classify(&canonical);
                (Some(canonical), level)
            }
            None => (None, MatchLevel::Unmatched),
        }
    }

    /// Follow the alias chain from `name` to its terminal string.
    ///
    /// Canonical names terminate immediately, so they always resolve to
    /// themselves.
    fn walk(&self, name: &str) -> Result<String, ResolveError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = name.to_string();
        loop {
            if self.hierarchy.is_canonical(&current) {
                return Ok(current);
            }
            let Some(next) = self.lookup.get(&current) else {
                return Ok(current);
            };
            let next = next.to_string();
            if !visited.insert(std::mem::replace(&mut current, next)) {
                return Err(ResolveError::CyclicAlias(name.to_string()));
            }
        }
    }
}
