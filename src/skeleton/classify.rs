use std::collections::{HashMap, HashSet, VecDeque};

use spade::handles::{FixedFaceHandle, FixedVertexHandle, InnerTag};
use spade::{
    ConstrainedDelaunayTriangulation, InsertionError, Point2 as SpadePoint2,
    PositionInTriangulation, Triangulation,
};

use crate::diagnostics::ErrorLog;
use crate::error::{OperationError, Result, TriangulationError};
use crate::math::{Point2, Vector2, TOLERANCE};

use super::graph::PolygonGraph;

pub(crate) type Cdt = ConstrainedDelaunayTriangulation<SpadePoint2<f64>>;

/// Policy deciding which regions of the input are inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InOutType {
    /// Regions to the left of counter-clockwise closed polygons are inside.
    #[default]
    VertexOrder,
    /// Any region enclosed by at least one edge is inside.
    SimpleReachability,
    /// Regions enclosed by an odd number of edges are inside.
    AlternatingReachability,
    /// As `AlternatingReachability`, but edges shared by several primitives
    /// do not count, so abutting polygons form one region.
    AlternatingReachabilityWithSharedEdges,
}

/// Which side of the input a wavefront propagates into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Inside,
    Outside,
}

impl Side {
    /// Both sides, inside first.
    pub const BOTH: [Side; 2] = [Side::Inside, Side::Outside];
}

/// A directed input segment that emits a wavefront into the region on its left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitSegment {
    pub from: Point2,
    pub to: Point2,
    pub weight: f64,
}

/// A constraint edge of the triangulation together with the input edges
/// running along it (`true` when the input edge runs from `a` to `b`).
#[derive(Debug, Clone)]
struct SubEdge {
    a: FixedVertexHandle,
    b: FixedVertexHandle,
    sources: Vec<(usize, bool)>,
}

/// Inside/outside labelling of the plane around a [`PolygonGraph`].
///
/// Built on a constrained Delaunay triangulation of every input edge plus a
/// bounding frame. Faces connected without crossing a constraint form a
/// region; every region gets one label.
pub struct Classification {
    cdt: Cdt,
    frame: [Point2; 4],
    in_out: InOutType,
    sub_edges: Vec<SubEdge>,
    sub_edge_index: HashMap<(FixedVertexHandle, FixedVertexHandle), usize>,
    merged: Vec<bool>,
    face_region: HashMap<usize, usize>,
    region_sides: Vec<Side>,
    crossings: usize,
}

impl Classification {
    /// Triangulates `graph` and labels its regions with `in_out`.
    ///
    /// Crossing edges are split where they cross, so overlapping loops share
    /// a vertex there. Should an input edge still not be traceable along the
    /// triangulation, it is dropped with a warning and the reachability
    /// policies fall back to [`InOutType::VertexOrder`].
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is empty or a point cannot be inserted.
    pub fn build(graph: &PolygonGraph, in_out: InOutType, log: &mut ErrorLog) -> Result<Self> {
        let (lo, hi) = graph
            .bounds()
            .ok_or_else(|| OperationError::InvalidInput("no input edges".into()))?;
        let frame = frame_around(lo, hi);

        let mut cdt = Cdt::new();
        let mut frame_handles = Vec::with_capacity(4);
        for p in &frame {
            frame_handles.push(insert(&mut cdt, p)?);
        }
        let mut handles = Vec::with_capacity(graph.points.len());
        for p in &graph.points {
            handles.push(insert(&mut cdt, p)?);
        }
        for i in 0..4 {
            cdt.add_constraint(frame_handles[i], frame_handles[(i + 1) % 4]);
        }

        let before = cdt.num_vertices();
        for edge in &graph.edges {
            let (a, b) = (handles[edge.start], handles[edge.end]);
            if a != b {
                cdt.add_constraint_and_split(a, b, |p| p);
            }
        }
        let crossings = cdt.num_vertices() - before;

        // Later edges may split earlier ones, so paths are traced only once
        // every edge is in.
        let mut untraced = 0;
        let mut sub_edges: Vec<SubEdge> = Vec::new();
        let mut sub_edge_index = HashMap::new();
        for (i, edge) in graph.edges.iter().enumerate() {
            let (a, b) = (handles[edge.start], handles[edge.end]);
            if a == b {
                continue;
            }
            let Some(path) = constraint_path(&cdt, a, b) else {
                untraced += 1;
                log.warning(format!(
                    "edge {} of a primitive could not be traced through the triangulation",
                    edge.vertex
                ));
                continue;
            };
            for (from, to) in path {
                let key = undirected(from, to);
                let index = *sub_edge_index.entry(key).or_insert_with(|| {
                    sub_edges.push(SubEdge {
                        a: key.0,
                        b: key.1,
                        sources: Vec::new(),
                    });
                    sub_edges.len() - 1
                });
                sub_edges[index].sources.push((i, from == key.0));
            }
        }

        let in_out = if untraced > 0 && in_out != InOutType::VertexOrder {
            log.warning(format!(
                "{untraced} input edges lost; falling back to vertex order classification"
            ));
            InOutType::VertexOrder
        } else {
            in_out
        };

        let merged = sub_edges
            .iter()
            .map(|s| {
                in_out == InOutType::AlternatingReachabilityWithSharedEdges && {
                    let prims: HashSet<_> =
                        s.sources.iter().map(|&(g, _)| graph.edges[g].prim).collect();
                    prims.len() >= 2
                }
            })
            .collect();

        let mut classification = Self {
            cdt,
            frame,
            in_out,
            sub_edges,
            sub_edge_index,
            merged,
            face_region: HashMap::new(),
            region_sides: Vec::new(),
            crossings,
        };
        classification.label_regions(graph);

        tracing::debug!(
            regions = classification.region_sides.len(),
            sub_edges = classification.sub_edges.len(),
            crossings,
            "classified input regions"
        );
        Ok(classification)
    }

    fn label_regions(&mut self, graph: &PolygonGraph) {
        let outer = self.cdt.outer_face().fix();

        let mut touches_frame = Vec::new();
        for face in self.cdt.inner_faces() {
            let start = face.fix();
            if self.face_region.contains_key(&start.index()) {
                continue;
            }
            let region = touches_frame.len();
            let mut touches = false;
            let mut queue = VecDeque::from([start]);
            self.face_region.insert(start.index(), region);
            while let Some(current) = queue.pop_front() {
                for edge in self.cdt.face(current).adjacent_edges() {
                    let neighbor = edge.rev().face();
                    if neighbor.fix() == outer {
                        touches = true;
                        continue;
                    }
                    if self.cdt.is_constraint_edge(edge.as_undirected().fix()) {
                        continue;
                    }
                    if let Some(inner) = neighbor.as_inner() {
                        if self.face_region.insert(inner.fix().index(), region).is_none() {
                            queue.push_back(inner.fix());
                        }
                    }
                }
            }
            touches_frame.push(touches);
        }

        self.region_sides = match self.in_out {
            InOutType::VertexOrder => self.vertex_order_sides(graph, &touches_frame),
            policy => {
                let depths = self.region_depths(touches_frame.len());
                depths
                    .iter()
                    .map(|&d| {
                        let inside = match policy {
                            InOutType::SimpleReachability => d >= 1,
                            _ => d % 2 == 1,
                        };
                        if inside {
                            Side::Inside
                        } else {
                            Side::Outside
                        }
                    })
                    .collect()
            }
        };
    }

    fn vertex_order_sides(&self, graph: &PolygonGraph, touches_frame: &[bool]) -> Vec<Side> {
        let mut votes = vec![0i64; touches_frame.len()];
        for sub in &self.sub_edges {
            for &(g, forward) in &sub.sources {
                if !graph.edges[g].closed {
                    continue;
                }
                let (from, to) = if forward { (sub.a, sub.b) } else { (sub.b, sub.a) };
                let Some(edge) = self.cdt.get_edge_from_neighbors(from, to) else {
                    continue;
                };
                if let Some(left) = self.region_of(edge.face().as_inner().map(|f| f.fix())) {
                    votes[left] += 1;
                }
                if let Some(right) = self.region_of(edge.rev().face().as_inner().map(|f| f.fix())) {
                    votes[right] -= 1;
                }
            }
        }
        votes
            .iter()
            .zip(touches_frame)
            .map(|(&v, &frame)| {
                if !frame && v > 0 {
                    Side::Inside
                } else {
                    Side::Outside
                }
            })
            .collect()
    }

    /// Minimum number of counted constraint crossings from the frame, per region.
    fn region_depths(&self, regions: usize) -> Vec<u32> {
        let outer = self.cdt.outer_face().fix();
        let mut depth: HashMap<usize, u32> = HashMap::new();
        let mut queue: VecDeque<(FixedFaceHandle<InnerTag>, u32)> = VecDeque::new();

        for edge in self.cdt.directed_edges() {
            if edge.face().fix() == outer {
                if let Some(inner) = edge.rev().face().as_inner() {
                    if depth.insert(inner.fix().index(), 0).is_none() {
                        queue.push_back((inner.fix(), 0));
                    }
                }
            }
        }

        while let Some((face, d)) = queue.pop_front() {
            if depth.get(&face.index()).is_some_and(|&known| known < d) {
                continue;
            }
            for edge in self.cdt.face(face).adjacent_edges() {
                let Some(neighbor) = edge.rev().face().as_inner() else {
                    continue;
                };
                let from = edge.from().fix();
                let to = edge.to().fix();
                let cost = if !self.cdt.is_constraint_edge(edge.as_undirected().fix())
                    || self.is_merged(from, to)
                {
                    0
                } else {
                    1
                };
                let nd = d + cost;
                let index = neighbor.fix().index();
                if depth.get(&index).map_or(true, |&known| nd < known) {
                    depth.insert(index, nd);
                    if cost == 0 {
                        queue.push_front((neighbor.fix(), nd));
                    } else {
                        queue.push_back((neighbor.fix(), nd));
                    }
                }
            }
        }

        let mut region_depth = vec![u32::MAX; regions];
        for (face, &d) in &depth {
            if let Some(&r) = self.face_region.get(face) {
                region_depth[r] = region_depth[r].min(d);
            }
        }
        region_depth.iter().map(|&d| if d == u32::MAX { 0 } else { d }).collect()
    }

    fn region_of(&self, face: Option<FixedFaceHandle<InnerTag>>) -> Option<usize> {
        face.and_then(|f| self.face_region.get(&f.index()).copied())
    }

    fn is_merged(&self, a: FixedVertexHandle, b: FixedVertexHandle) -> bool {
        self.sub_edge_index
            .get(&undirected(a, b))
            .is_some_and(|&i| self.merged[i])
    }

    fn face_side(&self, face: FixedFaceHandle<InnerTag>) -> Option<Side> {
        self.region_of(Some(face)).map(|r| self.region_sides[r])
    }

    /// The classification policy actually applied.
    #[must_use]
    pub fn in_out(&self) -> InOutType {
        self.in_out
    }

    /// Number of vertices added where input edges cross.
    #[must_use]
    pub fn crossings(&self) -> usize {
        self.crossings
    }

    /// Corners of the bounding frame, counter-clockwise.
    #[must_use]
    pub fn frame(&self) -> [Point2; 4] {
        self.frame
    }

    /// Label of every region, in region order.
    #[must_use]
    pub fn region_sides(&self) -> &[Side] {
        &self.region_sides
    }

    /// Label of every triangulation face as `(face index, side)`, sorted.
    #[must_use]
    pub fn face_sides(&self) -> Vec<(usize, Side)> {
        let mut sides: Vec<_> = self
            .face_region
            .iter()
            .map(|(&f, &r)| (f, self.region_sides[r]))
            .collect();
        sides.sort_by_key(|&(f, _)| f);
        sides
    }

    /// Label of the region containing `p`, or `None` outside the frame.
    #[must_use]
    pub fn side_at(&self, p: &Point2) -> Option<Side> {
        match self.cdt.locate(SpadePoint2::new(p.x, p.y)) {
            PositionInTriangulation::OnFace(face) => self.face_side(face),
            PositionInTriangulation::OnEdge(edge) => {
                let edge = self.cdt.directed_edge(edge);
                edge.face()
                    .as_inner()
                    .or_else(|| edge.rev().face().as_inner())
                    .and_then(|f| self.face_side(f.fix()))
            }
            PositionInTriangulation::OnVertex(vertex) => self
                .cdt
                .vertex(vertex)
                .out_edges()
                .find_map(|e| e.face().as_inner())
                .and_then(|f| self.face_side(f.fix())),
            _ => None,
        }
    }

    /// The input segments that emit a wavefront into `side`, each oriented
    /// so that the side lies on its left.
    ///
    /// A segment with `side` on both of its sides is returned once per
    /// direction. Weights are the largest weight of the input edges running
    /// along the segment.
    #[must_use]
    pub fn emitting(&self, side: Side, graph: &PolygonGraph) -> Vec<EmitSegment> {
        let mut segments = Vec::new();
        for (sub, &merged) in self.sub_edges.iter().zip(&self.merged) {
            if merged {
                continue;
            }
            let weight = sub
                .sources
                .iter()
                .map(|&(g, _)| match side {
                    Side::Inside => graph.edges[g].inside_weight,
                    Side::Outside => graph.edges[g].outside_weight,
                })
                .fold(f64::MIN, f64::max);
            for (from, to) in [(sub.a, sub.b), (sub.b, sub.a)] {
                let Some(edge) = self.cdt.get_edge_from_neighbors(from, to) else {
                    continue;
                };
                let left = edge.face().as_inner().and_then(|f| self.face_side(f.fix()));
                if left == Some(side) {
                    segments.push(EmitSegment {
                        from: to_point(edge.from().position()),
                        to: to_point(edge.to().position()),
                        weight,
                    });
                }
            }
        }
        segments
    }
}

/// Box around `[lo, hi]` grown by its diagonal on every side.
fn frame_around(lo: Point2, hi: Point2) -> [Point2; 4] {
    let diag = (hi - lo).norm();
    let margin = if diag < TOLERANCE { 1.0 } else { diag };
    let lo = lo - Vector2::new(margin, margin);
    let hi = hi + Vector2::new(margin, margin);
    [
        lo,
        Point2::new(hi.x, lo.y),
        hi,
        Point2::new(lo.x, hi.y),
    ]
}

pub(crate) fn insert(cdt: &mut Cdt, p: &Point2) -> Result<FixedVertexHandle> {
    cdt.insert(SpadePoint2::new(p.x, p.y))
        .map_err(|e: InsertionError| TriangulationError::Insertion(e.to_string()).into())
}

pub(crate) fn to_point(p: SpadePoint2<f64>) -> Point2 {
    Point2::new(p.x, p.y)
}

fn undirected(
    a: FixedVertexHandle,
    b: FixedVertexHandle,
) -> (FixedVertexHandle, FixedVertexHandle) {
    if a.index() <= b.index() {
        (a, b)
    } else {
        (b, a)
    }
}

/// Follows collinear constraint edges from `from` to `to`.
///
/// A single inserted constraint is split wherever it passes through an
/// existing vertex, so one input edge may map to several triangulation edges.
pub(crate) fn constraint_path(
    cdt: &Cdt,
    from: FixedVertexHandle,
    to: FixedVertexHandle,
) -> Option<Vec<(FixedVertexHandle, FixedVertexHandle)>> {
    let target = to_point(cdt.vertex(to).position());
    let mut path = Vec::new();
    let mut current = from;
    for _ in 0..cdt.num_vertices() {
        if current == to {
            return Some(path);
        }
        let here = to_point(cdt.vertex(current).position());
        let goal = target - here;
        let dist = goal.norm();
        let mut best: Option<(f64, FixedVertexHandle)> = None;
        for edge in cdt.vertex(current).out_edges() {
            if !cdt.is_constraint_edge(edge.as_undirected().fix()) {
                continue;
            }
            let step = to_point(edge.to().position()) - here;
            let len = step.norm();
            if len < TOLERANCE || len > dist * (1.0 + 1e-9) + TOLERANCE {
                continue;
            }
            let cos = step.dot(&goal) / (len * dist);
            if cos > 1.0 - 1e-6 && best.map_or(true, |(c, _)| cos > c) {
                best = Some((cos, edge.to().fix()));
            }
        }
        let (_, next) = best?;
        path.push((current, next));
        current = next;
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::detail::Detail;
    use crate::geometry::ProjectionPlane;
    use crate::math::Point3;
    use crate::skeleton::weights::WeightLookup;

    fn square(detail: &mut Detail, x0: f64, y0: f64, size: f64, ccw: bool) {
        let mut pts = vec![
            Point3::new(x0, y0, 0.0),
            Point3::new(x0 + size, y0, 0.0),
            Point3::new(x0 + size, y0 + size, 0.0),
            Point3::new(x0, y0 + size, 0.0),
        ];
        if !ccw {
            pts.reverse();
        }
        detail.add_polygon(&pts).unwrap();
    }

    fn classify(detail: &Detail, in_out: InOutType) -> (PolygonGraph, Classification, ErrorLog) {
        let plane = ProjectionPlane::default();
        let none = WeightLookup::new(detail, None);
        let graph = PolygonGraph::build(detail, None, &plane, 1e-6, &none, &none).unwrap();
        let mut log = ErrorLog::new();
        let c = Classification::build(&graph, in_out, &mut log).unwrap();
        (graph, c, log)
    }

    #[test]
    fn ccw_square_is_inside_under_vertex_order() {
        let mut detail = Detail::new();
        square(&mut detail, 0.0, 0.0, 1.0, true);
        let (graph, c, log) = classify(&detail, InOutType::VertexOrder);
        assert!(log.is_empty());
        assert_eq!(c.side_at(&Point2::new(0.5, 0.5)), Some(Side::Inside));
        assert_eq!(c.side_at(&Point2::new(1.5, 0.5)), Some(Side::Outside));
        assert_eq!(c.emitting(Side::Inside, &graph).len(), 4);
        assert_eq!(c.emitting(Side::Outside, &graph).len(), 4);
    }

    #[test]
    fn cw_square_is_outside_under_vertex_order() {
        let mut detail = Detail::new();
        square(&mut detail, 0.0, 0.0, 1.0, false);
        let (_, c, _) = classify(&detail, InOutType::VertexOrder);
        assert_eq!(c.side_at(&Point2::new(0.5, 0.5)), Some(Side::Outside));
        let (_, c, _) = classify(&detail, InOutType::SimpleReachability);
        assert_eq!(c.side_at(&Point2::new(0.5, 0.5)), Some(Side::Inside));
    }

    #[test]
    fn nested_squares_by_policy() {
        let mut detail = Detail::new();
        square(&mut detail, 0.0, 0.0, 4.0, true);
        square(&mut detail, 1.0, 1.0, 2.0, true);
        let ring = Point2::new(0.5, 0.5);
        let core = Point2::new(2.0, 2.0);

        let (_, c, _) = classify(&detail, InOutType::SimpleReachability);
        assert_eq!(c.side_at(&ring), Some(Side::Inside));
        assert_eq!(c.side_at(&core), Some(Side::Inside));

        let (_, c, _) = classify(&detail, InOutType::AlternatingReachability);
        assert_eq!(c.side_at(&ring), Some(Side::Inside));
        assert_eq!(c.side_at(&core), Some(Side::Outside));
    }

    #[test]
    fn shared_edges_merge_abutting_squares() {
        let mut detail = Detail::new();
        square(&mut detail, 0.0, 0.0, 1.0, true);
        square(&mut detail, 1.0, 0.0, 1.0, true);

        let (graph, c, _) = classify(&detail, InOutType::AlternatingReachabilityWithSharedEdges);
        assert_eq!(c.side_at(&Point2::new(0.5, 0.5)), Some(Side::Inside));
        assert_eq!(c.side_at(&Point2::new(1.5, 0.5)), Some(Side::Inside));
        // The shared edge does not emit.
        assert_eq!(c.emitting(Side::Inside, &graph).len(), 6);

        let (graph, c, _) = classify(&detail, InOutType::AlternatingReachability);
        assert_eq!(c.side_at(&Point2::new(1.5, 0.5)), Some(Side::Inside));
        assert_eq!(c.emitting(Side::Inside, &graph).len(), 8);
    }

    #[test]
    fn crossing_edges_are_split() {
        let mut detail = Detail::new();
        square(&mut detail, 0.0, 0.0, 2.0, true);
        detail
            .add_polyline(&[Point3::new(-1.0, 1.0, 0.0), Point3::new(3.0, 1.0, 0.0)])
            .unwrap();
        let (graph, c, log) = classify(&detail, InOutType::AlternatingReachability);
        assert!(log.is_empty(), "{:?}", log.entries());
        assert_eq!(c.in_out(), InOutType::AlternatingReachability);
        assert_eq!(c.crossings(), 2);
        assert_eq!(c.side_at(&Point2::new(1.0, 0.5)), Some(Side::Inside));
        assert_eq!(c.side_at(&Point2::new(1.0, 1.5)), Some(Side::Inside));
        assert_eq!(c.side_at(&Point2::new(2.5, 1.5)), Some(Side::Outside));
        // Six square pieces, plus the middle of the line seen from both sides.
        assert_eq!(c.emitting(Side::Inside, &graph).len(), 8);
    }

    #[test]
    fn overlapping_squares_by_policy() {
        let mut detail = Detail::new();
        square(&mut detail, 0.0, 0.0, 2.0, true);
        square(&mut detail, 1.0, 1.0, 2.0, true);
        let first = Point2::new(0.5, 0.5);
        let both = Point2::new(1.5, 1.5);
        let second = Point2::new(2.5, 2.5);
        let gap = Point2::new(2.5, 0.5);

        for in_out in [InOutType::VertexOrder, InOutType::SimpleReachability] {
            let (_, c, log) = classify(&detail, in_out);
            assert!(log.is_empty(), "{:?}", log.entries());
            assert_eq!(c.in_out(), in_out);
            assert_eq!(c.crossings(), 2);
            assert_eq!(c.side_at(&first), Some(Side::Inside));
            assert_eq!(c.side_at(&both), Some(Side::Inside));
            assert_eq!(c.side_at(&second), Some(Side::Inside));
            assert_eq!(c.side_at(&gap), Some(Side::Outside));
        }

        let (_, c, _) = classify(&detail, InOutType::AlternatingReachability);
        assert_eq!(c.side_at(&first), Some(Side::Inside));
        assert_eq!(c.side_at(&both), Some(Side::Outside));
        assert_eq!(c.side_at(&second), Some(Side::Inside));
    }

    #[test]
    fn classification_is_idempotent() {
        let mut detail = Detail::new();
        square(&mut detail, 0.0, 0.0, 4.0, true);
        square(&mut detail, 1.0, 1.0, 1.0, false);
        let (_, a, _) = classify(&detail, InOutType::VertexOrder);
        let (_, b, _) = classify(&detail, InOutType::VertexOrder);
        assert_eq!(a.face_sides(), b.face_sides());
        assert_eq!(a.region_sides(), b.region_sides());
        assert_eq!(a.side_at(&Point2::new(1.5, 1.5)), Some(Side::Outside));
        assert_eq!(a.side_at(&Point2::new(3.0, 3.0)), Some(Side::Inside));
    }
}
