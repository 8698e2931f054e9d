#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for stop-to-area assignment.
//!
//! Builds an R-tree over area polygon envelopes once per run and answers
//! point-in-polygon lookups against the true polygon geometry. Lookups are
//! read-only, so one index is shared by every caller.

pub mod assign;

use geo::{BoundingRect as _, Coord, Intersects as _, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject};
use transit_equity_geography::BoundaryDataset;
use transit_equity_geography_models::{Area, AreaCode, EARTH_RADIUS_M, LatLng};

pub use assign::{AssignmentReport, SpatialAssignmentMiss, assign_stops};

/// A boundary polygon stored in the R-tree with its code.
struct BoundaryEntry {
    code: AreaCode,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built R-tree over area polygons.
///
/// Constructed once from a [`BoundaryDataset`] and shared read-only across
/// all stages.
pub struct BoundaryIndex {
    tree: RTree<BoundaryEntry>,
    areas: Vec<Area>,
}

impl BoundaryIndex {
    /// Builds the index from loaded boundaries.
    #[must_use]
    pub fn new(dataset: &BoundaryDataset) -> Self {
        let entries: Vec<BoundaryEntry> = dataset
            .features
            .iter()
            .map(|f| BoundaryEntry {
                code: f.area.code.clone(),
                envelope: compute_envelope(&f.polygon),
                polygon: f.polygon.clone(),
            })
            .collect();
        let mut areas: Vec<Area> = dataset.features.iter().map(|f| f.area.clone()).collect();
        areas.sort_by(|a, b| a.code.cmp(&b.code));

        let tree = RTree::bulk_load(entries);
        log::info!("Built boundary index over {} areas", tree.size());
        Self { tree, areas }
    }

    /// Areas in code order.
    #[must_use]
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Number of indexed areas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no areas.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Looks up the area whose polygon contains `location`.
    ///
    /// Points on a shared edge or vertex intersect every polygon touching
    /// it; the lowest area code among them wins.
    #[must_use]
    pub fn lookup(&self, location: LatLng) -> Option<&AreaCode> {
        let point = Point::new(location.longitude, location.latitude);
        let query_env = AABB::from_point([location.longitude, location.latitude]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .map(|entry| &entry.code)
            .min()
    }

    /// Finds the nearest area whose boundary lies within `max_distance_m`
    /// of `location`, returning its code and the distance in metres.
    ///
    /// Distances use a local equirectangular projection centred on the
    /// point, which is accurate to well under a metre at snapping scales.
    #[must_use]
    pub fn nearest_within(&self, location: LatLng, max_distance_m: f64) -> Option<(&AreaCode, f64)> {
        if max_distance_m <= 0.0 || !max_distance_m.is_finite() {
            return None;
        }
        let lat = location.latitude;
        let lng = location.longitude;
        let metres_per_deg = EARTH_RADIUS_M.to_radians();
        let cos_lat = lat.to_radians().cos().max(1e-6);
        let dlat = max_distance_m / metres_per_deg;
        let dlng = max_distance_m / (metres_per_deg * cos_lat);
        let query_env = AABB::from_corners([lng - dlng, lat - dlat], [lng + dlng, lat + dlat]);

        let project = |c: Coord<f64>| -> (f64, f64) {
            (
                (c.x - lng) * cos_lat * metres_per_deg,
                (c.y - lat) * metres_per_deg,
            )
        };

        let mut best: Option<(&AreaCode, f64)> = None;
        for entry in self.tree.locate_in_envelope_intersecting(&query_env) {
            let distance = ring_distance(&entry.polygon, project);
            if distance > max_distance_m {
                continue;
            }
            let closer = best.is_none_or(|(code, d)| {
                distance
                    .total_cmp(&d)
                    .then_with(|| entry.code.cmp(code))
                    .is_lt()
            });
            if closer {
                best = Some((&entry.code, distance));
            }
        }
        best
    }
}

/// Minimum distance (metres) from the projection origin to any ring of
/// `polygon`.
fn ring_distance(polygon: &MultiPolygon<f64>, project: impl Fn(Coord<f64>) -> (f64, f64)) -> f64 {
    polygon
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .flat_map(|ring| ring.lines())
        .map(|line| segment_distance(project(line.start), project(line.end)))
        .fold(f64::INFINITY, f64::min)
}

/// Distance from the origin to the segment `a`-`b`.
fn segment_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx.mul_add(dx, dy * dy);
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (-(a.0.mul_add(dx, a.1 * dy)) / len_sq).clamp(0.0, 1.0)
    };
    let (x, y) = (t.mul_add(dx, a.0), t.mul_add(dy, a.1));
    x.hypot(y)
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::dataset;

    fn at(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).unwrap()
    }

    #[test]
    fn strictly_inside_point_gets_containing_area() {
        let index = BoundaryIndex::new(&dataset());
        assert_eq!(index.len(), 3);
        assert_eq!(index.lookup(at(0.5, 0.5)).unwrap().as_str(), "B");
        assert_eq!(index.lookup(at(0.5, 1.5)).unwrap().as_str(), "A");
        assert_eq!(index.lookup(at(0.5, 3.5)).unwrap().as_str(), "C");
    }

    #[test]
    fn shared_edge_goes_to_lowest_code() {
        let index = BoundaryIndex::new(&dataset());
        assert_eq!(index.lookup(at(0.5, 1.0)).unwrap().as_str(), "A");
        assert_eq!(index.lookup(at(1.0, 1.0)).unwrap().as_str(), "A");
    }

    #[test]
    fn outside_every_polygon_is_none() {
        let index = BoundaryIndex::new(&dataset());
        assert!(index.lookup(at(0.5, 2.5)).is_none());
        assert!(index.lookup(at(-5.0, -5.0)).is_none());
    }

    #[test]
    fn snaps_only_within_tolerance() {
        let index = BoundaryIndex::new(&dataset());
        // ~1.1 km east of A's east edge (x = 2) at the equator.
        let p = at(0.5, 2.01);
        let (code, d) = index.nearest_within(p, 2_000.0).unwrap();
        assert_eq!(code.as_str(), "A");
        assert!((d - 1_111.95).abs() < 1.0, "distance {d}");
        assert!(index.nearest_within(p, 500.0).is_none());
        assert!(index.nearest_within(p, 0.0).is_none());
    }

    #[test]
    fn areas_are_sorted() {
        let index = BoundaryIndex::new(&dataset());
        let codes: Vec<&str> = index.areas().iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
    }

    #[test]
    fn segment_distance_handles_endpoints() {
        assert!((segment_distance((3.0, 4.0), (3.0, 4.0)) - 5.0).abs() < 1e-9);
        assert!((segment_distance((-1.0, 2.0), (1.0, 2.0)) - 2.0).abs() < 1e-9);
        assert!((segment_distance((1.0, 0.0), (2.0, 0.0)) - 1.0).abs() < 1e-9);
    }
}
