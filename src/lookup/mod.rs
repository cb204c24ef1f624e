//! Alias table from arbitrary place-name strings to canonical unit names.
//!
//! Built once from the hierarchy, the ward lookup and the manual alias
//! table, then consumed read-only by the resolver. There is no incremental
//! update: a changed input means a rebuild.

mod aliases;

pub use aliases::AliasMap;

use hashbrown::{HashMap, HashSet};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::error::LookupError;
use crate::hierarchy::AdministrativeHierarchy;
use crate::models::AdminLevel;

static COMPOUND_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*|\s+and\s+").expect("valid regex"));

/// Split a compound name ("X and Y", "X, Y") into its components.
///
/// Returns an empty list when the name is not compound.
pub fn decompose(name: &str) -> Vec<String> {
    let parts: Vec<String> = COMPOUND_SEPARATOR
        .split(name.trim())
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != name)
        .map(str::to_string)
        .collect();

    if parts.len() >= 2 {
        parts
    } else {
        Vec::new()
    }
}

/// Finalized `alias -> canonical name` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameLookupTable {
    aliases: HashMap<String, String>,
}

impl NameLookupTable {
    /// Build the table.
    ///
    /// Sources are merged in order (manual corrections, compound district
    /// names, compound ward names), later sources overriding earlier ones.
    /// Keys that are canonical names at any level are then dropped.
    pub fn build(
        hierarchy: &AdministrativeHierarchy,
        manual: &AliasMap,
    ) -> Result<Self, LookupError> {
        let mut aliases: HashMap<String, String> = HashMap::new();

        for (alias, target) in manual.iter() {
            aliases.insert(alias.to_string(), target.to_string());
        }
        let manual_count = aliases.len();

        for name in hierarchy.names(AdminLevel::Lad) {
            for part in decompose(name) {
                aliases.insert(part, name.to_string());
            }
        }

        for (sub, parent) in hierarchy.subdivisions() {
            for part in decompose(sub) {
                aliases.insert(part, parent.clone());
            }
        }

        let before = aliases.len();
        aliases.retain(|alias, target| !hierarchy.is_canonical(alias) && *alias != *target);
        debug!(
            "Dropped {} aliases shadowing canonical names",
            before - aliases.len()
        );

        let table = Self { aliases };
        table.check_acyclic()?;

        info!(
            "Lookup table built: {} aliases ({} manual)",
            table.len(),
            manual_count
        );
        Ok(table)
    }

    fn check_acyclic(&self) -> Result<(), LookupError> {
        let mut safe: HashSet<&str> = HashSet::new();
        let mut keys: Vec<&str> = self.aliases.keys().map(String::as_str).collect();
        keys.sort_unstable();

        for start in keys {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut current = start;
            while let Some(next) = self.get(current) {
                if safe.contains(current) {
                    break;
                }
                if !seen.insert(current) {
                    return Err(LookupError::CyclicAlias(start.to_string()));
                }
                current = next;
            }
            safe.extend(seen);
        }
        Ok(())
    }

    /// Direct alias target
    pub fn get(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// All entries, sorted by alias
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .aliases
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn from_raw(pairs: &[(&str, &str)]) -> Self {
        Self {
            aliases: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}
