//! Geometric fallback: match a geocoder bounding box to the district it
//! mostly falls in.

use geo::{coord, Area, BooleanOps, Intersects, MultiPolygon, Polygon, Rect};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

use super::BoundaryIndex;
use crate::hierarchy::{AdminBoundary, AdministrativeHierarchy};
use crate::models::BoundingBox;

/// Why a bounding box could not be scored at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxRejection {
    /// A bound is NaN or infinite
    MissingCoordinate,
    /// Inverted or zero-area box
    Degenerate,
    /// Latitude span above the plausibility threshold
    TooCoarse,
}

/// Scores bounding boxes against finest-level unit polygons.
pub struct SpatialMatcher {
    index: BoundaryIndex,
    /// A unit must cover strictly more than this share of the box
    min_overlap: f64,
    /// Boxes taller than this (degrees latitude) are rejected
    max_lat_span: f64,
}

impl SpatialMatcher {
    pub fn new(index: BoundaryIndex, min_overlap: f64, max_lat_span: f64) -> Self {
        Self {
            index,
            min_overlap,
            max_lat_span,
        }
    }

    pub fn from_hierarchy(
        hierarchy: &AdministrativeHierarchy,
        min_overlap: f64,
        max_lat_span: f64,
    ) -> Self {
        Self::new(
            BoundaryIndex::build(hierarchy.boundaries()),
            min_overlap,
            max_lat_span,
        )
    }

    /// Check that a box is worth scoring and turn it into a polygon
    pub fn validate(&self, bbox: &BoundingBox) -> Result<Rect<f64>, BoxRejection> {
        if !bbox.is_complete() {
            return Err(BoxRejection::MissingCoordinate);
        }
        if bbox.north <= bbox.south || bbox.east <= bbox.west {
            return Err(BoxRejection::Degenerate);
        }
        if bbox.lat_span() > self.max_lat_span {
            return Err(BoxRejection::TooCoarse);
        }
        Ok(Rect::new(
            coord! { x: bbox.west, y: bbox.south },
            coord! { x: bbox.east, y: bbox.north },
        ))
    }

    /// Share of the box covered by each intersecting unit, ordered by unit name.
    pub fn overlap_scores(&self, bbox: &BoundingBox) -> Result<Vec<(Arc<AdminBoundary>, f64)>, BoxRejection> {
        let rect = self.validate(bbox)?;
        let query = rect.to_polygon();
        let query_area = query.unsigned_area();
        if !(query_area.is_finite() && query_area > 0.0) {
            return Err(BoxRejection::Degenerate);
        }

        Ok(self
            .index
            .candidates(&rect)
            .into_iter()
            .filter(|b| b.geometry.intersects(&query))
            .filter_map(|b| {
                let ratio = overlap_ratio(&b.geometry, &query, query_area)?;
                Some((b, ratio))
            })
            .collect())
    }

    /// Unit covering the largest share of the box, if that share exceeds the
    /// threshold. Ties keep the first maximal unit in name order.
    pub fn intersection_over_union(&self, bbox: &BoundingBox) -> Option<String> {
        let scores = match self.overlap_scores(bbox) {
            Ok(scores) => scores,
            Err(reason) => {
                debug!("Rejected bbox {:?}: {:?}", bbox, reason);
                return None;
            }
        };

        let mut best: Option<(Arc<AdminBoundary>, f64)> = None;
        for (boundary, ratio) in scores {
            if best.as_ref().map_or(true, |(_, r)| ratio > *r) {
                best = Some((boundary, ratio));
            }
        }

        let (boundary, ratio) = best?;
        debug!(
            "Best overlap for {:?}: {} ({:.3})",
            bbox, boundary.unit.name, ratio
        );
        (ratio > self.min_overlap).then(|| boundary.unit.name.clone())
    }

    pub fn index(&self) -> &BoundaryIndex {
        &self.index
    }
}

/// `area(unit ∩ box) / area(box)`; `None` on numeric failure.
fn overlap_ratio(geometry: &MultiPolygon<f64>, query: &Polygon<f64>, query_area: f64) -> Option<f64> {
    let area = panic::catch_unwind(AssertUnwindSafe(|| {
        geometry.intersection(query).unsigned_area()
    }))
    .ok()?;
    let ratio = area / query_area;
    ratio.is_finite().then_some(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::sample_hierarchy;

    fn matcher() -> SpatialMatcher {
        SpatialMatcher::from_hierarchy(&sample_hierarchy(), 0.6, 1.0)
    }

    #[test]
    fn test_box_inside_one_unit() {
        let m = matcher();
        let bbox = BoundingBox::new(0.2, 0.2, 0.8, 0.8);
        assert_eq!(m.intersection_over_union(&bbox), Some("Bristol, City of".to_string()));
    }

    #[test]
    fn test_majority_overlap_accepted() {
        let m = matcher();
        // 70% in South Gloucestershire [1,2], 30% in Bristol [0,1]
        let bbox = BoundingBox::new(0.1, 0.7, 0.5, 1.7);
        assert_eq!(
            m.intersection_over_union(&bbox),
            Some("South Gloucestershire".to_string())
        );
    }

    #[test]
    fn test_split_overlap_rejected() {
        let m = matcher();
        // 50/50 across two districts
        let bbox = BoundingBox::new(0.1, 0.5, 0.5, 1.5);
        assert_eq!(m.intersection_over_union(&bbox), None);

        let scores = m.overlap_scores(&bbox).unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|(_, r)| (r - 0.5).abs() < 1e-9));
    }

    #[test]
    fn test_box_outside_all_units() {
        let m = matcher();
        let bbox = BoundingBox::new(5.0, 5.0, 5.5, 5.5);
        assert_eq!(m.intersection_over_union(&bbox), None);
    }

    #[test]
    fn test_box_mostly_outside_rejected() {
        let m = matcher();
        // Only a quarter of the box lies over land
        let bbox = BoundingBox::new(0.5, 2.5, 1.5, 3.5);
        assert_eq!(m.intersection_over_union(&bbox), None);
    }

    #[test]
    fn test_bbox_validation() {
        let m = matcher();
        assert_eq!(
            m.validate(&BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0)),
            Err(BoxRejection::MissingCoordinate)
        );
        assert_eq!(
            m.validate(&BoundingBox::new(0.5, 0.0, 0.5, 1.0)),
            Err(BoxRejection::Degenerate)
        );
        assert!(m.validate(&BoundingBox::new(0.0, 0.0, 0.9, 0.9)).is_ok());
        assert_eq!(
            m.validate(&BoundingBox::new(-1.0, 0.0, 0.5, 1.0)),
            Err(BoxRejection::TooCoarse)
        );
        assert_eq!(m.intersection_over_union(&BoundingBox::new(-1.0, 0.2, 0.5, 0.8)), None);
    }
}
