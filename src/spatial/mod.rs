//! Geometric fallback for geocoder results that name no single district.
//!
//! Scores the geocoder's bounding box against finest-level polygons
//! found through an R-tree spatial index.

mod index;
mod matcher;

pub use index::BoundaryIndex;
pub use matcher::{BoxRejection, SpatialMatcher};
