//! Core data models for place resolution and mobility inference.

pub mod admin;
pub mod mobility;
pub mod resolution;

pub use admin::{AdminLevel, AdministrativeUnit};
pub use mobility::{
    MigrationFlow, MonthlyHomes, NetMigration, UserHomeAssignment, UserPostCount, YearMonth,
};
pub use resolution::{
    BoundingBox, GeocodeCandidate, MatchLevel, ResolutionMethod, ResolvedPlace,
};
