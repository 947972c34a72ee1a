use std::collections::HashMap;

use crate::detail::{Detail, PointId, PrimId};
use crate::error::Result;
use crate::geometry::ProjectionPlane;
use crate::math::Point2;

use super::weights::WeightLookup;

/// A directed input edge of the polygon graph.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    /// Index of the start point in [`PolygonGraph::points`].
    pub start: usize,
    /// Index of the end point.
    pub end: usize,
    /// The primitive the edge came from.
    pub prim: PrimId,
    /// Index of the edge's start vertex within `prim`.
    pub vertex: usize,
    /// Whether `prim` is a closed polygon.
    pub closed: bool,
    /// Wavefront speed on the inside of the edge.
    pub inside_weight: f64,
    /// Wavefront speed on the outside of the edge.
    pub outside_weight: f64,
}

/// Input geometry projected into the working plane.
///
/// Points closer than the merge tolerance are welded, so edges from
/// different primitives that meet at (nearly) the same location share
/// endpoints. Zero-length edges are dropped.
#[derive(Debug, Clone, Default)]
pub struct PolygonGraph {
    pub points: Vec<Point2>,
    pub edges: Vec<GraphEdge>,
}

impl PolygonGraph {
    /// Projects the primitives of `group` (or all primitives) into `plane`.
    ///
    /// # Errors
    ///
    /// Returns an error if the group does not exist.
    pub fn build(
        detail: &Detail,
        group: Option<&str>,
        plane: &ProjectionPlane,
        merge_tol: f64,
        inside_weights: &WeightLookup<'_>,
        outside_weights: &WeightLookup<'_>,
    ) -> Result<Self> {
        let mut graph = Self::default();
        let mut welder = PointWelder::new(merge_tol);
        let mut indices: HashMap<PointId, usize> = HashMap::new();

        for prim_id in detail.prims_in(group)? {
            let prim = detail.prim(prim_id)?;
            for (vertex, a, b) in prim.edges() {
                let ia = graph.point_index(detail, plane, &mut welder, &mut indices, a)?;
                let ib = graph.point_index(detail, plane, &mut welder, &mut indices, b)?;
                if ia == ib {
                    continue;
                }
                graph.edges.push(GraphEdge {
                    start: ia,
                    end: ib,
                    prim: prim_id,
                    vertex,
                    closed: prim.is_closed(),
                    inside_weight: inside_weights.edge_weight(prim_id, vertex, a),
                    outside_weight: outside_weights.edge_weight(prim_id, vertex, a),
                });
            }
        }

        tracing::debug!(
            points = graph.points.len(),
            edges = graph.edges.len(),
            "polygon graph built"
        );
        Ok(graph)
    }

    fn point_index(
        &mut self,
        detail: &Detail,
        plane: &ProjectionPlane,
        welder: &mut PointWelder,
        indices: &mut HashMap<PointId, usize>,
        id: PointId,
    ) -> Result<usize> {
        if let Some(&index) = indices.get(&id) {
            return Ok(index);
        }
        let p = plane.to_2d(&detail.point(id)?.position);
        let index = welder.weld(p, &mut self.points);
        indices.insert(id, index);
        Ok(index)
    }

    /// Returns `true` if the graph has no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Axis-aligned bounds of the points, or `None` for an empty graph.
    #[must_use]
    pub fn bounds(&self) -> Option<(Point2, Point2)> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold((first, first), |(lo, hi), p| {
            (
                Point2::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point2::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        }))
    }
}

/// Grid-hashed point merging.
///
/// Cells are twice the tolerance wide, so every point within tolerance of a
/// query lies in the query's cell or one of its eight neighbours.
#[derive(Debug, Clone, Default)]
pub(crate) struct PointWelder {
    tol: f64,
    cell: f64,
    grid: HashMap<(i64, i64), Vec<usize>>,
}

impl PointWelder {
    pub(crate) fn new(tol: f64) -> Self {
        let tol = tol.max(0.0);
        Self {
            tol,
            cell: tol.max(1e-9) * 2.0,
            grid: HashMap::new(),
        }
    }

    pub(crate) fn tol(&self) -> f64 {
        self.tol
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cell_of(&self, p: &Point2) -> (i64, i64) {
        ((p.x / self.cell).floor() as i64, (p.y / self.cell).floor() as i64)
    }

    /// First indexed point near `p` that `accept` agrees to.
    pub(crate) fn find(
        &self,
        p: &Point2,
        mut accept: impl FnMut(usize) -> bool,
    ) -> Option<usize> {
        let (cx, cy) = self.cell_of(p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(bucket) = self.grid.get(&(cx + dx, cy + dy)) {
                    if let Some(&i) = bucket.iter().find(|&&i| accept(i)) {
                        return Some(i);
                    }
                }
            }
        }
        None
    }

    /// Indexes point number `index` at `p`.
    pub(crate) fn insert(&mut self, p: &Point2, index: usize) {
        let key = self.cell_of(p);
        self.grid.entry(key).or_default().push(index);
    }

    fn weld(&mut self, p: Point2, points: &mut Vec<Point2>) -> usize {
        if let Some(i) = self.find(&p, |i| (points[i] - p).norm() <= self.tol) {
            return i;
        }
        let index = points.len();
        points.push(p);
        self.insert(&p, index);
        index
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point3;

    #[test]
    fn welds_coincident_points_across_primitives() {
        let mut detail = Detail::new();
        detail
            .add_polygon(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ])
            .unwrap();
        detail
            .add_polygon(&[
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(1.0, 1.0 + 1e-9, 0.0),
            ])
            .unwrap();
        let plane = ProjectionPlane::default();
        let none = WeightLookup::new(&detail, None);
        let graph = PolygonGraph::build(&detail, None, &plane, 1e-6, &none, &none).unwrap();
        assert_eq!(graph.points.len(), 4);
        assert_eq!(graph.edges.len(), 6);
        assert!(graph.edges.iter().all(|e| e.closed));
    }

    #[test]
    fn drops_zero_length_edges() {
        let mut detail = Detail::new();
        detail
            .add_polyline(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
            ])
            .unwrap();
        let plane = ProjectionPlane::default();
        let none = WeightLookup::new(&detail, None);
        let graph = PolygonGraph::build(&detail, None, &plane, 1e-6, &none, &none).unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert!(!graph.edges[0].closed);
        let (lo, hi) = graph.bounds().unwrap();
        assert!((hi.x - lo.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_group_is_an_error() {
        let detail = Detail::new();
        let plane = ProjectionPlane::default();
        let none = WeightLookup::new(&detail, None);
        assert!(PolygonGraph::build(&detail, Some("nope"), &plane, 1e-6, &none, &none).is_err());
    }
}
