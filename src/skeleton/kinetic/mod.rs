//! Kinetic triangulation of a propagating wavefront.
//!
//! The region swept by one side's wavefront is covered by triangles whose
//! vertices move with the wavefront. Whenever a triangle degenerates the
//! topology is repaired locally; the repairs are the skeleton's events.

pub mod collapse;
pub mod motion;

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use slotmap::{Key, SlotMap};

use crate::diagnostics::ErrorLog;
use crate::math::{left_normal, Point2, Vector2, TOLERANCE};

use super::classify::Side;
use super::result::{
    ArcEnd, EdgeKind, EdgeSpan, EventKind, SkeletonArc, SkeletonEvent, SkeletonRecord,
    VertexTrack, Wavefront,
};

use collapse::TriangleMotion;
use motion::vertex_motion;

slotmap::new_key_type! {
    /// Identifier of a moving wavefront vertex.
    pub struct VertexKey;
    /// Identifier of a wavefront edge.
    pub struct EdgeKey;
    /// Identifier of a kinetic triangle.
    pub struct TriangleKey;
}

/// A wavefront edge: the line `normal · p = offset + weight * t`, bounded by
/// two wavefront vertices. The propagating region lies on its left.
#[derive(Debug, Clone)]
pub struct WavefrontEdge {
    pub normal: Vector2,
    pub offset: f64,
    pub weight: f64,
    pub kind: EdgeKind,
    pub start: VertexKey,
    pub end: VertexKey,
    /// Index of the currently open span in the wavefront history.
    pub span: Option<usize>,
}

impl WavefrontEdge {
    /// Edge supported by the segment `from → to` at time 0.
    ///
    /// Returns `None` for a zero-length segment.
    #[must_use]
    pub fn new(from: Point2, to: Point2, weight: f64, kind: EdgeKind) -> Option<Self> {
        let dir = to - from;
        let len = dir.norm();
        if len < TOLERANCE {
            return None;
        }
        Some(Self::with_normal(left_normal(&(dir / len)), from, weight, kind))
    }

    /// Edge with unit `normal` through `point` at time 0.
    #[must_use]
    pub fn with_normal(normal: Vector2, point: Point2, weight: f64, kind: EdgeKind) -> Self {
        Self {
            normal,
            offset: normal.dot(&point.coords),
            weight,
            kind,
            start: VertexKey::null(),
            end: VertexKey::null(),
            span: None,
        }
    }

    /// Signed distance of `p` from the edge's supporting line at time `t`.
    #[must_use]
    pub fn signed_distance(&self, p: &Point2, t: f64) -> f64 {
        self.normal.dot(&p.coords) - self.offset - self.weight * t
    }
}

/// A vertex of the wavefront moving along a straight trajectory.
#[derive(Debug, Clone)]
pub struct WavefrontVertex {
    pub start_pos: Point2,
    pub start_time: f64,
    pub velocity: Vector2,
    pub incoming: EdgeKey,
    pub outgoing: EdgeKey,
    /// Skeleton node the vertex started from. Frame vertices have none.
    pub node: Option<usize>,
    pub infinite: bool,
    pub frame: bool,
    pub track: usize,
}

impl WavefrontVertex {
    /// Creates a vertex at `position` and `time` with no edges attached yet.
    #[must_use]
    pub fn new(position: Point2, time: f64) -> Self {
        Self {
            start_pos: position,
            start_time: time,
            velocity: Vector2::zeros(),
            incoming: EdgeKey::null(),
            outgoing: EdgeKey::null(),
            node: None,
            infinite: false,
            frame: false,
            track: 0,
        }
    }

    /// Position at `time`.
    #[must_use]
    pub fn position_at(&self, time: f64) -> Point2 {
        self.start_pos + self.velocity * (time - self.start_time)
    }
}

/// Scheduling state of a kinetic triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriangleState {
    Active,
    Collapsing(f64),
}

/// A triangle of the kinetic triangulation.
///
/// Vertices are counter-clockwise. Side `i` runs from `vertices[i + 1]` to
/// `vertices[i + 2]` and is either shared with `neighbors[i]` or lies on the
/// wavefront edge `wavefront[i]`.
#[derive(Debug, Clone)]
pub struct KineticTriangle {
    pub vertices: [VertexKey; 3],
    pub neighbors: [Option<TriangleKey>; 3],
    pub wavefront: [Option<EdgeKey>; 3],
    pub state: TriangleState,
    pub version: u64,
}

impl KineticTriangle {
    /// Creates a triangle over `vertices` with no neighbours or wavefront sides yet.
    #[must_use]
    pub fn new(vertices: [VertexKey; 3]) -> Self {
        Self {
            vertices,
            neighbors: [None; 3],
            wavefront: [None; 3],
            state: TriangleState::Active,
            version: 0,
        }
    }

    /// Corner index of `v`, if it is a corner of this triangle.
    #[must_use]
    pub fn index_of(&self, v: VertexKey) -> Option<usize> {
        self.vertices.iter().position(|&x| x == v)
    }
}

/// The initial state handed to a [`Simulation`].
#[derive(Debug, Default)]
pub struct KineticMesh {
    pub vertices: SlotMap<VertexKey, WavefrontVertex>,
    pub edges: SlotMap<EdgeKey, WavefrontEdge>,
    pub triangles: SlotMap<TriangleKey, KineticTriangle>,
}

impl KineticMesh {
    /// Sets a vertex's velocity from its incident edges.
    pub fn update_motion(&mut self, v: VertexKey, parallel_tol: f64) {
        let Some(vertex) = self.vertices.get(v) else {
            return;
        };
        let (Some(incoming), Some(outgoing)) =
            (self.edges.get(vertex.incoming), self.edges.get(vertex.outgoing))
        else {
            return;
        };
        let motion = vertex_motion(incoming, outgoing, parallel_tol);
        let frame = incoming.kind == EdgeKind::Frame && outgoing.kind == EdgeKind::Frame;
        if let Some(vertex) = self.vertices.get_mut(v) {
            vertex.velocity = motion.velocity;
            vertex.infinite = motion.infinite;
            vertex.frame = frame;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    time: f64,
    sequence: u64,
    triangle: TriangleKey,
    version: u64,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Event-driven propagation of one side's wavefront.
pub struct Simulation<'a> {
    mesh: KineticMesh,
    side: Side,
    tol: f64,
    parallel_tol: f64,
    now: f64,
    queue: BinaryHeap<Reverse<Scheduled>>,
    sequence: u64,
    wavefront: Wavefront,
    record: &'a mut SkeletonRecord,
    log: &'a mut ErrorLog,
}

impl<'a> Simulation<'a> {
    /// Prepares a simulation starting at time 0. Every non-frame vertex gets
    /// a skeleton node at its start position.
    pub fn new(
        mesh: KineticMesh,
        side: Side,
        tol: f64,
        parallel_tol: f64,
        record: &'a mut SkeletonRecord,
        log: &'a mut ErrorLog,
    ) -> Self {
        let mut sim = Self {
            mesh,
            side,
            tol,
            parallel_tol,
            now: 0.0,
            queue: BinaryHeap::new(),
            sequence: 0,
            wavefront: Wavefront::default(),
            record,
            log,
        };

        let vertices: Vec<VertexKey> = sim.mesh.vertices.keys().collect();
        for v in vertices {
            let vertex = &sim.mesh.vertices[v];
            let track = sim.wavefront.tracks.len();
            sim.wavefront.tracks.push(VertexTrack {
                start_pos: vertex.start_pos,
                start_time: vertex.start_time,
                velocity: vertex.velocity,
                stop_time: f64::INFINITY,
            });
            let node = (!vertex.frame)
                .then(|| sim.record.add_node(vertex.start_pos, vertex.start_time, tol));
            let vertex = &mut sim.mesh.vertices[v];
            vertex.track = track;
            vertex.node = node;
        }
        let edges: Vec<EdgeKey> = sim.mesh.edges.keys().collect();
        for e in edges {
            sim.open_span(e);
        }
        sim
    }

    /// Processes collapse events until none remain or `max_events` were
    /// handled, and returns the recorded wavefront history.
    pub fn run(mut self, max_events: usize) -> Wavefront {
        let triangles: Vec<TriangleKey> = self.mesh.triangles.keys().collect();
        for t in triangles {
            self.schedule(t);
        }

        let mut processed = 0usize;
        while let Some(Reverse(entry)) = self.queue.pop() {
            let current = self
                .mesh
                .triangles
                .get(entry.triangle)
                .is_some_and(|t| t.version == entry.version);
            if !current {
                continue;
            }
            if processed == max_events {
                self.log.error(format!(
                    "{:?} wavefront exceeded {max_events} events; skeleton is incomplete",
                    self.side
                ));
                break;
            }
            processed += 1;
            self.now = self.now.max(entry.time);
            self.handle(entry.triangle);
        }

        self.finish();
        tracing::debug!(side = ?self.side, events = processed, "wavefront propagation finished");
        self.wavefront
    }

    fn schedule(&mut self, t: TriangleKey) {
        let collapse = if self.infinite_side(t).is_some() {
            Some(0.0)
        } else {
            self.triangle_motion(t).and_then(|m| m.collapse_time(self.tol))
        };
        let Some(tri) = self.mesh.triangles.get_mut(t) else {
            return;
        };
        tri.version += 1;
        match collapse {
            Some(tau) => {
                let time = self.now + tau;
                tri.state = TriangleState::Collapsing(time);
                self.sequence += 1;
                self.queue.push(Reverse(Scheduled {
                    time,
                    sequence: self.sequence,
                    triangle: t,
                    version: tri.version,
                }));
            }
            None => tri.state = TriangleState::Active,
        }
    }

    fn reschedule(&mut self, triangles: Vec<TriangleKey>) {
        let mut seen = HashSet::new();
        for t in triangles {
            if seen.insert(t) {
                self.schedule(t);
            }
        }
    }

    fn triangle_motion(&self, t: TriangleKey) -> Option<TriangleMotion> {
        let tri = self.mesh.triangles.get(t)?;
        let mut positions = [Point2::origin(); 3];
        let mut velocities = [Vector2::zeros(); 3];
        let mut fresh = [false; 3];
        for (i, &v) in tri.vertices.iter().enumerate() {
            let vertex = self.mesh.vertices.get(v)?;
            positions[i] = vertex.position_at(self.now);
            velocities[i] = vertex.velocity;
            fresh[i] = vertex.start_time >= self.now;
        }
        Some(TriangleMotion {
            positions,
            velocities,
            fresh,
            wavefront_sides: tri.wavefront.iter().flatten().count(),
        })
    }

    /// A wavefront edge of `t` incident to a pinned (infinitely fast) vertex.
    fn infinite_side(&self, t: TriangleKey) -> Option<EdgeKey> {
        let tri = self.mesh.triangles.get(t)?;
        (0..3)
            .filter(|&i| self.mesh.vertices.get(tri.vertices[i]).is_some_and(|v| v.infinite))
            .find_map(|i| tri.wavefront[(i + 1) % 3].or(tri.wavefront[(i + 2) % 3]))
    }

    fn handle(&mut self, t: TriangleKey) {
        let Some(tri) = self.mesh.triangles.get(t).cloned() else {
            return;
        };
        let Some(motion) = self.triangle_motion(t) else {
            self.drop_triangle(t, "kinetic triangle references a stopped vertex");
            return;
        };

        if tri.wavefront.iter().all(Option::is_some) {
            self.remove_wavefront_triangle(t);
            return;
        }
        if let Some(e) = self.infinite_side(t) {
            self.merge(t, e);
            return;
        }
        for i in 0..3 {
            if let Some(e) = tri.wavefront[i] {
                if motion.side_length(i) <= self.tol {
                    self.merge(t, e);
                    return;
                }
            }
        }

        let mut longest = 0;
        for i in 1..3 {
            let (len, best) = (motion.side_length(i), motion.side_length(longest));
            let prefer_wavefront = (len - best).abs() <= self.tol
                && tri.wavefront[i].is_some()
                && tri.wavefront[longest].is_none();
            if len > best + self.tol || prefer_wavefront {
                longest = i;
            }
        }
        match (tri.wavefront[longest], tri.neighbors[longest]) {
            (Some(e), _) => self.split(t, longest, e),
            (None, Some(n)) => self.flip(t, longest, n),
            (None, None) => self.drop_triangle(t, "kinetic triangle side has no neighbour"),
        }
    }

    // --- Events ---

    /// Shrinks the wavefront edge `e` of `t` to a point.
    fn merge(&mut self, t: TriangleKey, e: EdgeKey) {
        let Some(edge) = self.mesh.edges.get(e) else {
            self.drop_triangle(t, "collapsing edge is missing");
            return;
        };
        let (va, vb) = (edge.start, edge.end);
        let (Some(a), Some(b)) = (self.mesh.vertices.get(va), self.mesh.vertices.get(vb)) else {
            self.drop_triangle(t, "collapsing edge lost a vertex");
            return;
        };
        let (pa, pb) = (a.position_at(self.now), b.position_at(self.now));
        let position = match (a.infinite, b.infinite) {
            (true, false) => pb,
            (false, true) => pa,
            _ => pa + (pb - pa) * 0.5,
        };
        let (incoming, outgoing) = (a.incoming, b.outgoing);

        let node = self.record.add_node(position, self.now, self.tol);
        self.push_event(EventKind::VertexMerge, position);
        self.stop_vertex(va, node);
        self.stop_vertex(vb, node);
        self.remove_edge(e);
        let Some(tri) = self.mesh.triangles.remove(t) else {
            return;
        };

        if incoming == outgoing {
            // The component was a two-edge loop and is gone entirely.
            self.remove_edge(incoming);
            self.detach(t, &tri);
            return;
        }

        let vn = self.add_vertex(position, incoming, outgoing, Some(node));
        if let Some(edge) = self.mesh.edges.get_mut(incoming) {
            edge.end = vn;
        }
        if let Some(edge) = self.mesh.edges.get_mut(outgoing) {
            edge.start = vn;
        }
        self.restart_span(incoming);
        self.restart_span(outgoing);

        let (Some(ia), Some(ib)) = (tri.index_of(va), tri.index_of(vb)) else {
            self.log.error("collapsed triangle does not contain its own edge");
            return;
        };
        let (n1, w1) = (tri.neighbors[ia], tri.wavefront[ia]);
        let (n2, w2) = (tri.neighbors[ib], tri.wavefront[ib]);
        // Side `ia` runs through `vb`, side `ib` through `va`.
        let mut touched = self.walk_fan(n1, t, vb, vn);
        touched.extend(self.walk_fan(n2, t, va, vn));
        if let Some(t1) = n1 {
            self.relink(t1, t, n2, w2);
            touched.push(t1);
        }
        if let Some(t2) = n2 {
            self.relink(t2, t, n1, w1);
            touched.push(t2);
        }
        if self.is_two_loop(vn) {
            self.collapse_two_loop(vn, &touched);
        }
        self.reschedule(touched);
    }

    /// The vertex opposite side `j` hit the interior of wavefront edge `e`.
    fn split(&mut self, t: TriangleKey, j: usize, e: EdgeKey) {
        let Some(tri) = self.mesh.triangles.get(t).cloned() else {
            return;
        };
        let v = tri.vertices[j];
        let Some(vertex) = self.mesh.vertices.get(v) else {
            self.drop_triangle(t, "splitting vertex is missing");
            return;
        };
        let position = vertex.position_at(self.now);
        let (e_l, e_r) = (vertex.incoming, vertex.outgoing);
        let Some(edge) = self.mesh.edges.get(e).cloned() else {
            self.drop_triangle(t, "split edge is missing");
            return;
        };
        let b = edge.end;

        let node = self.record.add_node(position, self.now, self.tol);
        self.push_event(EventKind::Split, position);
        self.stop_vertex(v, node);

        // `e` keeps its start and now ends at `v2`; `e2` carries the rest.
        let e2 = self.mesh.edges.insert(WavefrontEdge {
            start: VertexKey::null(),
            span: None,
            ..edge
        });
        let v1 = self.add_vertex(position, e_l, e2, Some(node));
        let v2 = self.add_vertex(position, e, e_r, Some(node));
        if let Some(edge) = self.mesh.edges.get_mut(e_l) {
            edge.end = v1;
        }
        if let Some(edge) = self.mesh.edges.get_mut(e2) {
            edge.start = v1;
        }
        if let Some(edge) = self.mesh.edges.get_mut(e) {
            edge.end = v2;
        }
        if let Some(edge) = self.mesh.edges.get_mut(e_r) {
            edge.start = v2;
        }
        if let Some(vertex) = self.mesh.vertices.get_mut(b) {
            vertex.incoming = e2;
        }
        self.restart_span(e_l);
        self.restart_span(e);
        self.restart_span(e_r);
        self.open_span(e2);

        self.mesh.triangles.remove(t);
        // Across (b, v) and across (v, a).
        let nb = tri.neighbors[(j + 1) % 3];
        let na = tri.neighbors[(j + 2) % 3];
        let mut touched = self.walk_fan(nb, t, v, v1);
        touched.extend(self.walk_fan(na, t, v, v2));
        if let Some(n) = nb {
            self.relink(n, t, None, Some(e2));
        }
        if let Some(n) = na {
            self.relink(n, t, None, Some(e));
        }
        for nv in [v1, v2] {
            if self.is_two_loop(nv) {
                self.collapse_two_loop(nv, &touched);
            }
        }
        self.reschedule(touched);
    }

    /// The vertex opposite side `j` crossed the spoke shared with `n`.
    fn flip(&mut self, t: TriangleKey, j: usize, n: TriangleKey) {
        let (Some(tri), Some(other)) = (
            self.mesh.triangles.get(t).cloned(),
            self.mesh.triangles.get(n).cloned(),
        ) else {
            return;
        };
        let (vi, p, q) = (tri.vertices[j], tri.vertices[(j + 1) % 3], tri.vertices[(j + 2) % 3]);
        let Some(k) = other.neighbors.iter().position(|&x| x == Some(t)) else {
            self.drop_triangle(t, "flip partner does not point back");
            return;
        };
        if other.vertices[(k + 1) % 3] != q || other.vertices[(k + 2) % 3] != p {
            self.drop_triangle(t, "flip partner has mismatched vertices");
            return;
        }
        let w = other.vertices[k];

        // (vi, p) and (q, vi) of `tri`; (p, w) and (w, q) of `other`.
        let (t_q, wt_q) = (tri.neighbors[(j + 2) % 3], tri.wavefront[(j + 2) % 3]);
        let (t_p, wt_p) = (tri.neighbors[(j + 1) % 3], tri.wavefront[(j + 1) % 3]);
        let (o_q, wo_q) = (other.neighbors[(k + 1) % 3], other.wavefront[(k + 1) % 3]);
        let (o_p, wo_p) = (other.neighbors[(k + 2) % 3], other.wavefront[(k + 2) % 3]);

        if let Some(first) = self.mesh.triangles.get_mut(t) {
            first.vertices = [vi, p, w];
            first.neighbors = [o_q, Some(n), t_q];
            first.wavefront = [wo_q, None, wt_q];
        }
        if let Some(second) = self.mesh.triangles.get_mut(n) {
            second.vertices = [vi, w, q];
            second.neighbors = [o_p, t_p, Some(t)];
            second.wavefront = [wo_p, wt_p, None];
        }
        if let Some(x) = o_q {
            self.relink(x, n, Some(t), None);
        }
        if let Some(x) = t_p {
            self.relink(x, t, Some(n), None);
        }

        let position = self
            .mesh
            .vertices
            .get(vi)
            .map_or_else(Point2::origin, |v| v.position_at(self.now));
        self.push_event(EventKind::EdgeFlip, position);
        self.reschedule(vec![t, n]);
    }

    /// All three sides are wavefront edges: the triangle and its edges vanish.
    fn remove_wavefront_triangle(&mut self, t: TriangleKey) {
        let Some(tri) = self.mesh.triangles.remove(t) else {
            return;
        };
        let mut nodes = [0usize; 3];
        let mut center = Vector2::zeros();
        for (i, &v) in tri.vertices.iter().enumerate() {
            let p = self
                .mesh
                .vertices
                .get(v)
                .map_or_else(Point2::origin, |vertex| vertex.position_at(self.now));
            center += p.coords / 3.0;
            nodes[i] = self.record.add_node(p, self.now, self.tol);
        }
        self.push_event(EventKind::TriangleRemoved, Point2::from(center));
        for (i, &v) in tri.vertices.iter().enumerate() {
            self.stop_vertex(v, nodes[i]);
        }

        let mut distinct = nodes.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        match distinct.as_slice() {
            [a, b] => self.push_arc(*a, *b),
            [a, b, c] => {
                // Collinear remains: connect the middle node to both ends.
                let dist = |x: usize, y: usize| {
                    (self.record.nodes[x].position - self.record.nodes[y].position).norm()
                };
                let (ab, ac, bc) = (dist(*a, *b), dist(*a, *c), dist(*b, *c));
                let (ends, middle) = if ab >= ac && ab >= bc {
                    ((*a, *b), *c)
                } else if ac >= bc {
                    ((*a, *c), *b)
                } else {
                    ((*b, *c), *a)
                };
                self.push_arc(ends.0, middle);
                self.push_arc(middle, ends.1);
            }
            _ => {}
        }
        for e in tri.wavefront.into_iter().flatten() {
            self.remove_edge(e);
        }
    }

    /// Stops both vertices of a loop of two coincident, opposite edges.
    ///
    /// `seeds` are triangles known to lie around `v`.
    fn collapse_two_loop(&mut self, v: VertexKey, seeds: &[TriangleKey]) {
        let Some(vertex) = self.mesh.vertices.get(v) else {
            return;
        };
        let (ein, eout) = (vertex.incoming, vertex.outgoing);
        let p = vertex.position_at(self.now);
        let Some(other) = self.mesh.edges.get(eout).map(|e| e.end) else {
            return;
        };
        let q = self
            .mesh
            .vertices
            .get(other)
            .map_or(p, |o| o.position_at(self.now));

        let nv = self.record.add_node(p, self.now, self.tol);
        let no = self.record.add_node(q, self.now, self.tol);
        self.stop_vertex(v, nv);
        self.stop_vertex(other, no);
        self.push_arc(nv, no);
        self.remove_edge(ein);
        self.remove_edge(eout);

        for d in self.triangles_around(seeds, &[v, other]) {
            if let Some(tri) = self.mesh.triangles.remove(d) {
                self.detach(d, &tri);
            }
        }
        tracing::debug!(side = ?self.side, time = self.now, "two-edge wavefront loop collapsed");
    }

    // --- Bookkeeping ---

    fn add_vertex(
        &mut self,
        position: Point2,
        incoming: EdgeKey,
        outgoing: EdgeKey,
        node: Option<usize>,
    ) -> VertexKey {
        let mut vertex = WavefrontVertex::new(position, self.now);
        vertex.incoming = incoming;
        vertex.outgoing = outgoing;
        vertex.node = node;
        vertex.track = self.wavefront.tracks.len();
        let v = self.mesh.vertices.insert(vertex);
        self.mesh.update_motion(v, self.parallel_tol);
        let velocity = self.mesh.vertices[v].velocity;
        self.wavefront.tracks.push(VertexTrack {
            start_pos: position,
            start_time: self.now,
            velocity,
            stop_time: f64::INFINITY,
        });
        v
    }

    fn stop_vertex(&mut self, v: VertexKey, node: usize) {
        let Some(vertex) = self.mesh.vertices.remove(v) else {
            return;
        };
        self.wavefront.tracks[vertex.track].stop_time = self.now;
        if let Some(start) = vertex.node {
            self.push_arc(start, node);
        }
    }

    fn push_arc(&mut self, start: usize, end: usize) {
        if start != end {
            self.record.arcs.push(SkeletonArc {
                start,
                end: ArcEnd::Node(end),
                side: self.side,
            });
        }
    }

    fn push_event(&mut self, kind: EventKind, position: Point2) {
        self.record.events.push(SkeletonEvent {
            time: self.now,
            kind,
            position,
            side: self.side,
        });
    }

    fn open_span(&mut self, e: EdgeKey) {
        let Some(edge) = self.mesh.edges.get(e) else {
            return;
        };
        let (Some(start), Some(end)) = (
            self.mesh.vertices.get(edge.start),
            self.mesh.vertices.get(edge.end),
        ) else {
            return;
        };
        let span = EdgeSpan {
            start: start.track,
            end: end.track,
            from_time: self.now,
            to_time: f64::INFINITY,
            weight: edge.weight,
            kind: edge.kind,
        };
        let index = self.wavefront.spans.len();
        self.wavefront.spans.push(span);
        if let Some(edge) = self.mesh.edges.get_mut(e) {
            edge.span = Some(index);
        }
    }

    fn close_span(&mut self, e: EdgeKey) {
        let span = self.mesh.edges.get(e).and_then(|edge| edge.span);
        if let Some(span) = span.and_then(|s| self.wavefront.spans.get_mut(s)) {
            span.to_time = self.now;
        }
    }

    fn restart_span(&mut self, e: EdgeKey) {
        self.close_span(e);
        self.open_span(e);
    }

    fn remove_edge(&mut self, e: EdgeKey) {
        self.close_span(e);
        self.mesh.edges.remove(e);
    }

    fn is_two_loop(&self, v: VertexKey) -> bool {
        let Some(vertex) = self.mesh.vertices.get(v) else {
            return false;
        };
        match (
            self.mesh.edges.get(vertex.incoming),
            self.mesh.edges.get(vertex.outgoing),
        ) {
            (Some(a), Some(b)) => vertex.incoming != vertex.outgoing && a.start == b.end,
            _ => false,
        }
    }

    /// Triangles with a corner in `corners`, reached from `seeds` through
    /// neighbours that also have one.
    fn triangles_around(&self, seeds: &[TriangleKey], corners: &[VertexKey]) -> Vec<TriangleKey> {
        let touches = |t: TriangleKey| {
            self.mesh
                .triangles
                .get(t)
                .is_some_and(|tri| corners.iter().any(|&c| tri.index_of(c).is_some()))
        };
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut stack: Vec<TriangleKey> = seeds.iter().copied().filter(|&t| touches(t)).collect();
        while let Some(t) = stack.pop() {
            if !seen.insert(t) {
                continue;
            }
            found.push(t);
            if let Some(tri) = self.mesh.triangles.get(t) {
                stack.extend(tri.neighbors.iter().flatten().copied().filter(|&n| touches(n)));
            }
        }
        found
    }

    /// Walks the fan of `old` starting at `start` (entered from `from`),
    /// replacing `old` by `new` until the fan ends at a wavefront edge.
    fn walk_fan(
        &mut self,
        start: Option<TriangleKey>,
        from: TriangleKey,
        old: VertexKey,
        new: VertexKey,
    ) -> Vec<TriangleKey> {
        let mut visited = Vec::new();
        let mut prev = from;
        let mut current = start;
        while let Some(t) = current {
            if visited.len() > self.mesh.triangles.len() {
                self.log.error("vertex fan does not terminate");
                break;
            }
            let Some(tri) = self.mesh.triangles.get_mut(t) else {
                break;
            };
            let Some(i) = tri.index_of(old) else {
                break;
            };
            tri.vertices[i] = new;
            let (s1, s2) = ((i + 1) % 3, (i + 2) % 3);
            let next = if tri.neighbors[s1] == Some(prev) {
                tri.neighbors[s2]
            } else {
                tri.neighbors[s1]
            };
            visited.push(t);
            prev = t;
            current = next;
        }
        visited
    }

    /// Points the side of `t` that faced `old` at `neighbor` / `wavefront`.
    fn relink(
        &mut self,
        t: TriangleKey,
        old: TriangleKey,
        neighbor: Option<TriangleKey>,
        wavefront: Option<EdgeKey>,
    ) {
        if let Some(tri) = self.mesh.triangles.get_mut(t) {
            if let Some(i) = tri.neighbors.iter().position(|&n| n == Some(old)) {
                tri.neighbors[i] = neighbor;
                tri.wavefront[i] = wavefront;
            }
        }
    }

    fn detach(&mut self, t: TriangleKey, tri: &KineticTriangle) {
        for n in tri.neighbors.iter().flatten() {
            self.relink(*n, t, None, None);
        }
    }

    fn drop_triangle(&mut self, t: TriangleKey, reason: &str) {
        self.log.error(format!("{reason}; triangle dropped at t = {}", self.now));
        if let Some(tri) = self.mesh.triangles.remove(t) {
            self.detach(t, &tri);
        }
    }

    /// Turns the vertices still moving into unbounded arcs.
    fn finish(&mut self) {
        for vertex in self.mesh.vertices.values() {
            if vertex.frame || vertex.infinite || vertex.velocity.norm() <= self.tol {
                continue;
            }
            if let Some(start) = vertex.node {
                self.record.arcs.push(SkeletonArc {
                    start,
                    end: ArcEnd::Ray(vertex.velocity.normalize()),
                    side: self.side,
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Fan-triangulated convex polygon with counter-clockwise corners.
    fn convex_mesh(corners: &[(f64, f64)]) -> KineticMesh {
        let n = corners.len();
        let pts: Vec<Point2> = corners.iter().map(|&(x, y)| Point2::new(x, y)).collect();
        let mut mesh = KineticMesh::default();
        let vertices: Vec<VertexKey> = pts
            .iter()
            .map(|&p| mesh.vertices.insert(WavefrontVertex::new(p, 0.0)))
            .collect();
        let edges: Vec<EdgeKey> = (0..n)
            .map(|i| {
                let mut edge =
                    WavefrontEdge::new(pts[i], pts[(i + 1) % n], 1.0, EdgeKind::Input).unwrap();
                edge.start = vertices[i];
                edge.end = vertices[(i + 1) % n];
                mesh.edges.insert(edge)
            })
            .collect();
        for i in 0..n {
            let v = &mut mesh.vertices[vertices[i]];
            v.incoming = edges[(i + n - 1) % n];
            v.outgoing = edges[i];
        }
        for &v in &vertices {
            mesh.update_motion(v, 1e-9);
        }

        let tris: Vec<TriangleKey> = (1..n - 1)
            .map(|i| {
                mesh.triangles
                    .insert(KineticTriangle::new([vertices[0], vertices[i], vertices[i + 1]]))
            })
            .collect();
        for (idx, &t) in tris.iter().enumerate() {
            let i = idx + 1;
            let tri = &mut mesh.triangles[t];
            tri.wavefront[0] = Some(edges[i]);
            if i + 1 == n - 1 {
                tri.wavefront[1] = Some(edges[n - 1]);
            } else {
                tri.neighbors[1] = Some(tris[idx + 1]);
            }
            if i == 1 {
                tri.wavefront[2] = Some(edges[0]);
            } else {
                tri.neighbors[2] = Some(tris[idx - 1]);
            }
        }
        mesh
    }

    #[test]
    fn unit_square_collapses_to_its_center() {
        let mesh = convex_mesh(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let mut record = SkeletonRecord::default();
        let mut log = ErrorLog::new();
        let wavefront =
            Simulation::new(mesh, Side::Inside, 1e-7, 1e-9, &mut record, &mut log).run(1000);

        assert!(log.is_empty(), "{:?}", log.entries());
        assert_eq!(record.arcs.len(), 4);
        let center = record.nodes.iter().find(|n| n.time > 0.0).unwrap();
        assert_abs_diff_eq!(center.position.x, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(center.position.y, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(center.time, 0.5, epsilon = 1e-9);
        assert!(record
            .arcs
            .iter()
            .all(|a| matches!(a.end, ArcEnd::Node(n) if record.nodes[n].time > 0.0)));
        assert!(wavefront.tracks.iter().all(|t| t.stop_time.is_finite()));
    }

    #[test]
    fn rectangle_has_a_ridge() {
        let mesh = convex_mesh(&[(0.0, 0.0), (4.0, 0.0), (4.0, 2.0), (0.0, 2.0)]);
        let mut record = SkeletonRecord::default();
        let mut log = ErrorLog::new();
        Simulation::new(mesh, Side::Inside, 1e-7, 1e-9, &mut record, &mut log).run(1000);

        assert!(log.is_empty(), "{:?}", log.entries());
        let interior: Vec<_> = record.nodes.iter().filter(|n| n.time > 0.0).collect();
        assert_eq!(interior.len(), 2);
        for n in &interior {
            assert_abs_diff_eq!(n.time, 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(n.position.y, 1.0, epsilon = 1e-9);
        }
        // Four corner arcs plus the ridge.
        assert_eq!(record.arcs.len(), 5);
    }

    #[test]
    fn events_are_time_ordered() {
        let mesh = convex_mesh(&[(0.0, 0.0), (3.0, 0.0), (4.0, 2.0), (2.0, 4.0), (-1.0, 2.0)]);
        let mut record = SkeletonRecord::default();
        let mut log = ErrorLog::new();
        Simulation::new(mesh, Side::Inside, 1e-7, 1e-9, &mut record, &mut log).run(1000);
        assert!(!record.events.is_empty());
        assert!(record.events.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn vertices_stay_on_their_edges() {
        let mesh = convex_mesh(&[(0.0, 0.0), (3.0, 0.0), (3.0, 1.0), (0.0, 2.0)]);
        for vertex in mesh.vertices.values() {
            let p = vertex.position_at(0.25);
            for e in [vertex.incoming, vertex.outgoing] {
                assert_abs_diff_eq!(mesh.edges[e].signed_distance(&p, 0.25), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn queue_pops_earliest_first() {
        let mut heap = BinaryHeap::new();
        for (i, time) in [0.7, 0.2, 0.5].into_iter().enumerate() {
            heap.push(Reverse(Scheduled {
                time,
                sequence: i as u64,
                triangle: TriangleKey::null(),
                version: 0,
            }));
        }
        let order: Vec<f64> = std::iter::from_fn(|| heap.pop().map(|Reverse(s)| s.time)).collect();
        assert_eq!(order, vec![0.2, 0.5, 0.7]);
    }
}
