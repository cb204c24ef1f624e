//! Administrative hierarchy types.

use serde::{Deserialize, Serialize};

/// Levels of the national hierarchy, finest first.
///
/// `Lad` (local authority district) is the canonical resolution target; the
/// International Territorial Level tiers group districts into progressively
/// larger statistical territories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AdminLevel {
    /// Local authority district (finest level)
    Lad,
    /// ITL3: upper-tier authorities and groups of districts
    Itl3,
    /// ITL2: counties and groups of counties
    Itl2,
    /// ITL1: regions and nations
    Itl1,
}

impl AdminLevel {
    /// All levels in hierarchical order (finest first)
    pub fn all() -> &'static [AdminLevel] {
        &[
            AdminLevel::Lad,
            AdminLevel::Itl3,
            AdminLevel::Itl2,
            AdminLevel::Itl1,
        ]
    }

    /// Levels above the finest one, in ascending order
    pub fn coarser() -> &'static [AdminLevel] {
        &AdminLevel::all()[1..]
    }

    pub fn is_finest(&self) -> bool {
        *self == AdminLevel::Lad
    }

    /// Get the field name for this level
    pub fn field_name(&self) -> &'static str {
        match self {
            AdminLevel::Lad => "lad",
            AdminLevel::Itl3 => "itl3",
            AdminLevel::Itl2 => "itl2",
            AdminLevel::Itl1 => "itl1",
        }
    }
}

impl std::fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

impl std::str::FromStr for AdminLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        AdminLevel::all()
            .iter()
            .copied()
            .find(|level| level.field_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown level '{}', expected one of lad, itl3, itl2, itl1", s))
    }
}

/// A named administrative unit at one level of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdministrativeUnit {
    /// Canonical name, unique within its level
    pub name: String,

    pub level: AdminLevel,
}

impl AdministrativeUnit {
    pub fn new(name: impl Into<String>, level: AdminLevel) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }
}
