//! Locus - place-name resolution and monthly migration flows
//!
//! Free-text place strings are resolved to administrative units through an
//! alias lookup, an external geocoder and a bounding-box overlap fallback.
//! Resolved posts give each user a monthly home, and consecutive months of
//! homes give origin/destination flows. This library backs the `resolve`
//! and `migrate` binaries.

pub mod config;
pub mod context;
pub mod error;
pub mod flows;
pub mod geocoder;
pub mod hierarchy;
pub mod home;
pub mod lookup;
pub mod models;
pub mod pipeline;
pub mod records;
pub mod resolver;
pub mod spatial;

pub use context::ResolverContext;
pub use models::{AdminLevel, MatchLevel, ResolvedPlace};
pub use pipeline::ResolutionPipeline;
pub use resolver::NameResolver;
