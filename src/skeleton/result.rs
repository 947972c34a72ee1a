use std::collections::{HashMap, HashSet};

use crate::detail::PrimId;
use crate::geometry::ProjectionPlane;
use crate::math::{Point2, Vector2};

use super::classify::{InOutType, Side};
use super::graph::PointWelder;

/// A vertex of the skeleton graph: where wavefront vertices started or met.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkeletonNode {
    pub position: Point2,
    pub time: f64,
}

/// Where a skeleton arc ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArcEnd {
    /// A finite arc ending at a node.
    Node(usize),
    /// An unbounded arc leaving its start node along a unit direction.
    Ray(Vector2),
}

/// The trace of one wavefront vertex between two nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkeletonArc {
    pub start: usize,
    pub end: ArcEnd,
    pub side: Side,
}

/// The four ways a kinetic triangle can collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A vertex crossed a spoke; the spoke was flipped.
    EdgeFlip,
    /// A wavefront edge shrank to zero length and its endpoints merged.
    VertexMerge,
    /// A reflex vertex hit the interior of a wavefront edge.
    Split,
    /// All three sides were wavefront edges; the triangle vanished.
    TriangleRemoved,
}

/// One processed collapse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkeletonEvent {
    pub time: f64,
    pub kind: EventKind,
    pub position: Point2,
    pub side: Side,
}

/// Linear trajectory of a wavefront vertex over `[start_time, stop_time)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexTrack {
    pub start_pos: Point2,
    pub start_time: f64,
    pub velocity: Vector2,
    pub stop_time: f64,
}

impl VertexTrack {
    /// Position of the vertex at `time`.
    #[must_use]
    pub fn position_at(&self, time: f64) -> Point2 {
        self.start_pos + self.velocity * (time - self.start_time)
    }

    /// Returns `true` if the vertex exists at `time`.
    #[must_use]
    pub fn alive_at(&self, time: f64) -> bool {
        self.start_time <= time && time < self.stop_time
    }
}

/// What a wavefront edge was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// An input edge.
    Input,
    /// A zero-length cap at a dangling polyline end.
    Cap,
    /// The receding box closing the outside wavefront.
    Frame,
}

/// An interval of a wavefront edge's life during which its endpoints
/// (indices into [`Wavefront::tracks`]) stay fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSpan {
    pub start: usize,
    pub end: usize,
    pub from_time: f64,
    pub to_time: f64,
    pub weight: f64,
    pub kind: EdgeKind,
}

impl EdgeSpan {
    /// Returns `true` if the span exists at `time`.
    #[must_use]
    pub fn alive_at(&self, time: f64) -> bool {
        self.from_time <= time && time < self.to_time
    }

    /// Overlap of the span's lifetime with `[t0, t1]`, if it has positive length.
    #[must_use]
    pub fn overlap(&self, t0: f64, t1: f64) -> Option<(f64, f64)> {
        let from = self.from_time.max(t0);
        let to = self.to_time.min(t1);
        (to > from).then_some((from, to))
    }
}

/// The recorded history of one side's wavefront.
#[derive(Debug, Clone, Default)]
pub struct Wavefront {
    pub tracks: Vec<VertexTrack>,
    pub spans: Vec<EdgeSpan>,
}

/// A chain of wavefront edges sampled at one time.
#[derive(Debug, Clone, PartialEq)]
pub struct WavefrontLoop {
    pub points: Vec<Point2>,
    /// Weight of the edge leaving `points[i]`.
    pub weights: Vec<f64>,
    pub closed: bool,
}

impl Wavefront {
    /// Chains the spans alive at `time` into loops.
    ///
    /// Frame spans never appear in the result. With `omit_caps`, cap spans
    /// are dropped as well and the loops containing them are returned as
    /// open chains.
    #[must_use]
    pub fn loops_at(&self, time: f64, omit_caps: bool) -> Vec<WavefrontLoop> {
        let alive: Vec<usize> = (0..self.spans.len())
            .filter(|&i| self.spans[i].kind != EdgeKind::Frame && self.spans[i].alive_at(time))
            .collect();
        let mut by_start: HashMap<usize, usize> = HashMap::new();
        let mut by_end: HashMap<usize, usize> = HashMap::new();
        for &i in &alive {
            by_start.entry(self.spans[i].start).or_insert(i);
            by_end.entry(self.spans[i].end).or_insert(i);
        }

        let mut visited = HashSet::new();
        let mut loops = Vec::new();
        for &seed in &alive {
            if visited.contains(&seed) {
                continue;
            }
            let (chain, closed) = self.chain_from(seed, &by_start, &by_end, &mut visited);
            for (piece, piece_closed) in split_at_caps(&chain, closed, omit_caps, &self.spans) {
                loops.push(self.sample_chain(&piece, piece_closed, time));
            }
        }
        loops
    }

    fn chain_from(
        &self,
        seed: usize,
        by_start: &HashMap<usize, usize>,
        by_end: &HashMap<usize, usize>,
        visited: &mut HashSet<usize>,
    ) -> (Vec<usize>, bool) {
        // Back up to the head of an open chain.
        let mut head = seed;
        while let Some(&prev) = by_end.get(&self.spans[head].start) {
            if prev == seed || visited.contains(&prev) {
                break;
            }
            head = prev;
            if head == seed {
                break;
            }
        }

        let mut chain = vec![head];
        visited.insert(head);
        let mut current = head;
        let mut closed = false;
        while let Some(&next) = by_start.get(&self.spans[current].end) {
            if next == head {
                closed = true;
                break;
            }
            if !visited.insert(next) {
                break;
            }
            chain.push(next);
            current = next;
        }
        (chain, closed)
    }

    fn sample_chain(&self, chain: &[usize], closed: bool, time: f64) -> WavefrontLoop {
        let mut points: Vec<Point2> = chain
            .iter()
            .map(|&s| self.tracks[self.spans[s].start].position_at(time))
            .collect();
        if !closed {
            if let Some(&last) = chain.last() {
                points.push(self.tracks[self.spans[last].end].position_at(time));
            }
        }
        WavefrontLoop {
            points,
            weights: chain.iter().map(|&s| self.spans[s].weight).collect(),
            closed,
        }
    }
}

fn split_at_caps(
    chain: &[usize],
    closed: bool,
    omit_caps: bool,
    spans: &[EdgeSpan],
) -> Vec<(Vec<usize>, bool)> {
    let is_cap = |s: &usize| spans[*s].kind == EdgeKind::Cap;
    if !omit_caps || !chain.iter().any(is_cap) {
        return vec![(chain.to_vec(), closed)];
    }

    let mut ordered = chain.to_vec();
    if closed {
        if let Some(first_cap) = ordered.iter().position(is_cap) {
            ordered.rotate_left(first_cap);
        }
    }
    ordered
        .split(is_cap)
        .filter(|piece| !piece.is_empty())
        .map(|piece| (piece.to_vec(), false))
        .collect()
}

/// Nodes, arcs and events accumulated while both sides are simulated.
#[derive(Debug, Clone, Default)]
pub struct SkeletonRecord {
    pub nodes: Vec<SkeletonNode>,
    pub arcs: Vec<SkeletonArc>,
    pub events: Vec<SkeletonEvent>,
    welder: PointWelder,
}

impl SkeletonRecord {
    /// Returns the node at `position`/`time`, adding it if no node lies within `tol`.
    pub fn add_node(&mut self, position: Point2, time: f64, tol: f64) -> usize {
        if self.welder.tol().to_bits() != tol.max(0.0).to_bits() {
            self.welder = PointWelder::new(tol);
            for (i, node) in self.nodes.iter().enumerate() {
                self.welder.insert(&node.position, i);
            }
        }
        let nodes = &self.nodes;
        let existing = self.welder.find(&position, |i| {
            (nodes[i].position - position).norm() <= tol && (nodes[i].time - time).abs() <= tol
        });
        if let Some(i) = existing {
            return i;
        }
        self.nodes.push(SkeletonNode { position, time });
        let index = self.nodes.len() - 1;
        self.welder.insert(&position, index);
        index
    }
}

/// A computed straight skeleton together with the wavefront history it was
/// derived from.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub(crate) plane: ProjectionPlane,
    pub(crate) distance_tol: f64,
    pub(crate) parallelism_tol: f64,
    pub(crate) in_out: InOutType,
    pub(crate) record: SkeletonRecord,
    pub(crate) inside: Wavefront,
    pub(crate) outside: Wavefront,
    pub(crate) input_prims: Vec<PrimId>,
}

impl Skeleton {
    /// The plane the skeleton was computed in.
    #[must_use]
    pub fn plane(&self) -> &ProjectionPlane {
        &self.plane
    }

    /// Coincidence tolerance used during computation.
    #[must_use]
    pub fn distance_tol(&self) -> f64 {
        self.distance_tol
    }

    /// Parallelism tolerance used during computation.
    #[must_use]
    pub fn parallelism_tol(&self) -> f64 {
        self.parallelism_tol
    }

    /// The classification policy that was actually applied, after any fallback.
    #[must_use]
    pub fn in_out(&self) -> InOutType {
        self.in_out
    }

    /// Every skeleton node, input corners included.
    #[must_use]
    pub fn nodes(&self) -> &[SkeletonNode] {
        &self.record.nodes
    }

    /// Arcs of both sides.
    #[must_use]
    pub fn arcs(&self) -> &[SkeletonArc] {
        &self.record.arcs
    }

    /// Events in processing order.
    #[must_use]
    pub fn events(&self) -> &[SkeletonEvent] {
        &self.record.events
    }

    /// Arcs traced on one side.
    pub fn arcs_on(&self, side: Side) -> impl Iterator<Item = &SkeletonArc> {
        self.record.arcs.iter().filter(move |a| a.side == side)
    }

    /// Wavefront history of one side.
    #[must_use]
    pub fn wavefront(&self, side: Side) -> &Wavefront {
        match side {
            Side::Inside => &self.inside,
            Side::Outside => &self.outside,
        }
    }

    /// The primitives the skeleton was computed from.
    #[must_use]
    pub fn input_prims(&self) -> &[PrimId] {
        &self.input_prims
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn shrinking_square() -> Wavefront {
        let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let tracks = corners
            .iter()
            .map(|&(x, y)| VertexTrack {
                start_pos: Point2::new(x, y),
                start_time: 0.0,
                velocity: Vector2::new(0.5 - x, 0.5 - y) * 2.0,
                stop_time: 0.5,
            })
            .collect();
        let spans = (0..4)
            .map(|i| EdgeSpan {
                start: i,
                end: (i + 1) % 4,
                from_time: 0.0,
                to_time: 0.5,
                weight: 1.0,
                kind: EdgeKind::Input,
            })
            .collect();
        Wavefront { tracks, spans }
    }

    #[test]
    fn track_liveness_is_half_open() {
        let w = shrinking_square();
        assert!(w.tracks[0].alive_at(0.0));
        assert!(w.tracks[0].alive_at(0.49));
        assert!(!w.tracks[0].alive_at(0.5));
    }

    #[test]
    fn samples_a_closed_loop() {
        let w = shrinking_square();
        let loops = w.loops_at(0.25, false);
        assert_eq!(loops.len(), 1);
        assert!(loops[0].closed);
        assert_eq!(loops[0].points.len(), 4);
        assert_abs_diff_eq!(loops[0].points[0].x, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(loops[0].points[2].y, 0.75, epsilon = 1e-12);
        assert!(w.loops_at(0.5, false).is_empty());
    }

    #[test]
    fn caps_cut_loops_open() {
        let mut w = shrinking_square();
        w.spans[2].kind = EdgeKind::Cap;
        let kept = w.loops_at(0.1, false);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].closed);

        let cut = w.loops_at(0.1, true);
        assert_eq!(cut.len(), 1);
        assert!(!cut[0].closed);
        // Spans 3, 0, 1 remain: four points, three edges.
        assert_eq!(cut[0].points.len(), 4);
        assert_eq!(cut[0].weights.len(), 3);
    }

    #[test]
    fn frame_spans_are_hidden() {
        let mut w = shrinking_square();
        for span in &mut w.spans {
            span.kind = EdgeKind::Frame;
        }
        assert!(w.loops_at(0.1, false).is_empty());
    }

    #[test]
    fn span_overlap() {
        let span = EdgeSpan {
            start: 0,
            end: 1,
            from_time: 0.2,
            to_time: 0.6,
            weight: 1.0,
            kind: EdgeKind::Input,
        };
        assert_eq!(span.overlap(0.0, 0.4), Some((0.2, 0.4)));
        assert_eq!(span.overlap(0.6, 1.0), None);
    }

    #[test]
    fn nodes_are_deduplicated() {
        let mut record = SkeletonRecord::default();
        let a = record.add_node(Point2::new(0.5, 0.5), 0.5, 1e-6);
        let b = record.add_node(Point2::new(0.5, 0.5 + 1e-9), 0.5, 1e-6);
        let c = record.add_node(Point2::new(1.0, 0.5), 0.5, 1e-6);
        let later = record.add_node(Point2::new(0.5, 0.5), 0.7, 1e-6);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, later);
        assert_eq!(record.nodes.len(), 3);
    }
}
