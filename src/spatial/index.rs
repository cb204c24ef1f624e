//! Spatial index over finest-level boundaries.

use geo::Rect;
use rstar::{RTree, RTreeObject, AABB};
use std::sync::Arc;
use tracing::info;

use crate::hierarchy::AdminBoundary;

/// Wrapper for R-tree indexing of admin boundaries
#[derive(Clone)]
pub struct IndexedBoundary {
    pub boundary: Arc<AdminBoundary>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedBoundary {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedBoundary {
    pub fn new(boundary: Arc<AdminBoundary>) -> Option<Self> {
        let (min_x, min_y, max_x, max_y) = boundary.bbox()?;
        Some(Self {
            boundary,
            envelope: AABB::from_corners([min_x, min_y], [max_x, max_y]),
        })
    }
}

/// R-tree of finest-level boundaries
pub struct BoundaryIndex {
    tree: RTree<IndexedBoundary>,
}

impl BoundaryIndex {
    /// Build spatial index from admin boundaries
    pub fn build(boundaries: &[Arc<AdminBoundary>]) -> Self {
        info!(
            "Building spatial index for {} boundaries...",
            boundaries.len()
        );

        let indexed: Vec<IndexedBoundary> = boundaries
            .iter()
            .filter(|b| b.unit.level.is_finest())
            .cloned()
            .filter_map(IndexedBoundary::new)
            .collect();

        let tree = RTree::bulk_load(indexed);
        info!("Spatial index built with {} entries", tree.size());

        Self { tree }
    }

    /// Boundaries whose envelope intersects `rect`, ordered by unit name
    pub fn candidates(&self, rect: &Rect<f64>) -> Vec<Arc<AdminBoundary>> {
        let query = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

        let mut found: Vec<Arc<AdminBoundary>> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|ib| Arc::clone(&ib.boundary))
            .collect();
        found.sort_by(|a, b| a.unit.name.cmp(&b.unit.name));
        found
    }

    /// Get total number of indexed boundaries
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
