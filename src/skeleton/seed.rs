use std::collections::{BTreeMap, HashMap};

use spade::handles::FixedVertexHandle;
use spade::Triangulation;

use crate::diagnostics::ErrorLog;
use crate::error::Result;
use crate::math::{cross_2d, Point2, Vector2};

use super::classify::{
    constraint_path, insert, to_point, Cdt, Classification, EmitSegment, Side,
};
use super::kinetic::motion::is_reflex;
use super::kinetic::{
    EdgeKey, KineticMesh, KineticTriangle, TriangleKey, VertexKey, WavefrontEdge, WavefrontVertex,
};
use super::result::EdgeKind;

type DirectedKey = (FixedVertexHandle, FixedVertexHandle);

/// An outgoing edge of a triangulation vertex, sorted by angle.
struct Spoke {
    target: FixedVertexHandle,
    dir: Vector2,
    wall: bool,
    /// Face to the left of the spoke, if it is an inner face of the side.
    face: Option<usize>,
}

/// A dangling endpoint that needs a cap edge.
struct CapSplit {
    face: usize,
    left: VertexKey,
    right: VertexKey,
    dir: Vector2,
}

/// Builds the initial kinetic triangulation of one side.
///
/// The emitting segments (and, for the outside, the classification frame)
/// are triangulated on their own; faces are kept if they lie in `side`.
/// Around every vertex each fan of kept faces between two constraints
/// becomes one wavefront vertex. A segment end with a single constraint gets
/// a zero-length cap edge perpendicular to the segment.
///
/// # Errors
///
/// Returns an error if a point cannot be inserted into the triangulation.
pub fn seed_mesh(
    classification: &Classification,
    segments: &[EmitSegment],
    side: Side,
    parallel_tol: f64,
    log: &mut ErrorLog,
) -> Result<KineticMesh> {
    let mut mesh = KineticMesh::default();
    if segments.is_empty() {
        return Ok(mesh);
    }

    let mut cdt = Cdt::new();
    let mut constraints: Vec<(DirectedKey, f64, EdgeKind)> = Vec::new();
    for segment in segments {
        let a = insert(&mut cdt, &segment.from)?;
        let b = insert(&mut cdt, &segment.to)?;
        if a != b {
            constraints.push(((a, b), segment.weight, EdgeKind::Input));
        }
    }
    if side == Side::Outside {
        let frame = classification.frame();
        let mut handles = Vec::with_capacity(4);
        for p in &frame {
            handles.push(insert(&mut cdt, p)?);
        }
        for i in 0..4 {
            constraints.push(((handles[i], handles[(i + 1) % 4]), 0.0, EdgeKind::Frame));
        }
    }
    for &((a, b), _, _) in &constraints {
        cdt.add_constraint_and_split(a, b, |p| p);
    }
    let mut directed: BTreeMap<DirectedKey, (f64, EdgeKind)> = BTreeMap::new();
    for &((a, b), weight, kind) in &constraints {
        let Some(path) = constraint_path(&cdt, a, b) else {
            log.warning("wavefront segment could not be traced and was ignored");
            continue;
        };
        for key in path {
            directed.entry(key).or_insert((weight, kind));
        }
    }

    // Faces of the side, with their corners counter-clockwise.
    let mut faces: BTreeMap<usize, [FixedVertexHandle; 3]> = BTreeMap::new();
    for face in cdt.inner_faces() {
        let vertices = face.vertices();
        let positions = vertices.map(|v| to_point(v.position()));
        let center =
            Point2::from((positions[0].coords + positions[1].coords + positions[2].coords) / 3.0);
        if classification.side_at(&center) == Some(side) {
            faces.insert(face.fix().index(), vertices.map(|v| v.fix()));
        }
    }

    let mut edges: HashMap<DirectedKey, EdgeKey> = HashMap::new();
    let mut corners: HashMap<(FixedVertexHandle, usize), VertexKey> = HashMap::new();
    let mut caps = Vec::new();

    for vertex in cdt.vertices() {
        let u = vertex.fix();
        let here = to_point(vertex.position());
        let mut spokes: Vec<Spoke> = vertex
            .out_edges()
            .map(|e| Spoke {
                target: e.to().fix(),
                dir: (to_point(e.to().position()) - here).normalize(),
                wall: cdt.is_constraint_edge(e.as_undirected().fix()),
                face: e
                    .face()
                    .as_inner()
                    .map(|f| f.fix().index())
                    .filter(|f| faces.contains_key(f)),
            })
            .collect();
        spokes.sort_by(|a, b| a.dir.y.atan2(a.dir.x).total_cmp(&b.dir.y.atan2(b.dir.x)));

        let m = spokes.len();
        let walls: Vec<usize> = (0..m).filter(|&i| spokes[i].wall).collect();
        for (w, &first) in walls.iter().enumerate() {
            if spokes[first].face.is_none() {
                continue;
            }
            let last = walls[(w + 1) % walls.len()];
            let count = if walls.len() == 1 { m } else { (last + m - first) % m };
            let sector: Vec<usize> = (0..count).map(|k| (first + k) % m).collect();

            let out_key = (u, spokes[first].target);
            let in_key = (spokes[last].target, u);
            let (Some(outgoing), Some(incoming)) = (
                wavefront_edge(&mut mesh, &mut edges, &directed, &cdt, out_key),
                wavefront_edge(&mut mesh, &mut edges, &directed, &cdt, in_key),
            ) else {
                log.error("wavefront sector is not bounded by emitting segments");
                continue;
            };

            if walls.len() > 1 {
                let v = attach_vertex(&mut mesh, here, incoming, outgoing);
                for &k in &sector {
                    if let Some(f) = spokes[k].face {
                        corners.insert((u, f), v);
                    }
                }
                continue;
            }

            // Dangling end: split the fan with a cap edge facing away from the segment.
            let dir = spokes[first].dir;
            let (w_out, w_in) = (mesh.edges[outgoing].weight, mesh.edges[incoming].weight);
            let cap = mesh.edges.insert(WavefrontEdge::with_normal(
                -dir,
                here,
                w_out.max(w_in),
                EdgeKind::Cap,
            ));
            let left = attach_vertex(&mut mesh, here, cap, outgoing);
            let right = attach_vertex(&mut mesh, here, incoming, cap);

            let split = sector
                .iter()
                .position(|&k| wedge_contains(&spokes[k].dir, &spokes[(k + 1) % m].dir, &-dir))
                .unwrap_or(count / 2);
            for (pos, &k) in sector.iter().enumerate() {
                if let Some(f) = spokes[k].face {
                    corners.insert((u, f), if pos <= split { left } else { right });
                    if pos == split {
                        caps.push(CapSplit {
                            face: f,
                            left,
                            right,
                            dir,
                        });
                    }
                }
            }
        }
    }

    finish_edges(&mut mesh, parallel_tol);

    let mut triangles: Vec<[VertexKey; 3]> = Vec::new();
    let mut face_triangles: HashMap<usize, Vec<usize>> = HashMap::new();
    for (&f, &handles) in &faces {
        let keys = handles.map(|h| corners.get(&(h, f)).copied());
        let [Some(a), Some(b), Some(c)] = keys else {
            log.error("a face of the wavefront region has an unassigned corner");
            continue;
        };
        face_triangles.entry(f).or_default().push(triangles.len());
        triangles.push([a, b, c]);
    }
    for cap in &caps {
        split_for_cap(&mesh, &mut triangles, &mut face_triangles, cap);
    }

    link_triangles(&mut mesh, &triangles, log);

    let reflex = mesh
        .vertices
        .values()
        .filter(|v| is_reflex(&mesh.edges[v.incoming], &mesh.edges[v.outgoing]))
        .count();
    tracing::debug!(
        side = ?side,
        vertices = mesh.vertices.len(),
        reflex,
        triangles = mesh.triangles.len(),
        caps = caps.len(),
        "seeded kinetic triangulation"
    );
    Ok(mesh)
}

/// The wavefront edge for a directed emitting segment, created on first use.
fn wavefront_edge(
    mesh: &mut KineticMesh,
    edges: &mut HashMap<DirectedKey, EdgeKey>,
    directed: &BTreeMap<DirectedKey, (f64, EdgeKind)>,
    cdt: &Cdt,
    key: DirectedKey,
) -> Option<EdgeKey> {
    if let Some(&e) = edges.get(&key) {
        return Some(e);
    }
    let &(weight, kind) = directed.get(&key)?;
    let from = to_point(cdt.vertex(key.0).position());
    let to = to_point(cdt.vertex(key.1).position());
    let e = mesh.edges.insert(WavefrontEdge::new(from, to, weight, kind)?);
    edges.insert(key, e);
    Some(e)
}

fn attach_vertex(
    mesh: &mut KineticMesh,
    at: Point2,
    incoming: EdgeKey,
    outgoing: EdgeKey,
) -> VertexKey {
    let mut vertex = WavefrontVertex::new(at, 0.0);
    vertex.incoming = incoming;
    vertex.outgoing = outgoing;
    let v = mesh.vertices.insert(vertex);
    mesh.edges[incoming].end = v;
    mesh.edges[outgoing].start = v;
    v
}

/// Sets frame speeds and vertex velocities.
///
/// The frame recedes faster than any other vertex moves, so no wavefront
/// ever reaches it.
fn finish_edges(mesh: &mut KineticMesh, parallel_tol: f64) {
    let keys: Vec<VertexKey> = mesh.vertices.keys().collect();
    for &v in &keys {
        mesh.update_motion(v, parallel_tol);
    }
    let fastest = mesh
        .vertices
        .values()
        .filter(|v| !v.frame && !v.infinite)
        .map(|v| v.velocity.norm())
        .fold(0.0, f64::max);
    let mut has_frame = false;
    for edge in mesh.edges.values_mut() {
        if edge.kind == EdgeKind::Frame {
            edge.weight = -(2.0 * fastest + 1.0);
            has_frame = true;
        }
    }
    if has_frame {
        for &v in &keys {
            mesh.update_motion(v, parallel_tol);
        }
    }
}

/// Returns `true` if `d` lies in the counter-clockwise wedge from `a` to `b`.
fn wedge_contains(a: &Vector2, b: &Vector2, d: &Vector2) -> bool {
    if cross_2d(a, b) >= 0.0 {
        cross_2d(a, d) >= 0.0 && cross_2d(d, b) > 0.0
    } else {
        cross_2d(a, d) >= 0.0 || cross_2d(d, b) > 0.0
    }
}

/// Replaces the triangle holding `cap.left` whose corner wedge contains the
/// cap direction by a cap triangle and the remaining triangle.
fn split_for_cap(
    mesh: &KineticMesh,
    triangles: &mut Vec<[VertexKey; 3]>,
    face_triangles: &mut HashMap<usize, Vec<usize>>,
    cap: &CapSplit,
) {
    let Some(candidates) = face_triangles.get(&cap.face).cloned() else {
        return;
    };
    let position = |v: VertexKey| mesh.vertices[v].start_pos;
    let away = -cap.dir;
    for t in candidates {
        let tri = triangles[t];
        let Some(i) = tri.iter().position(|&v| v == cap.left) else {
            continue;
        };
        let (u, y, z) = (tri[i], tri[(i + 1) % 3], tri[(i + 2) % 3]);
        let origin = position(u);
        let (dy, dz) = (position(y) - origin, position(z) - origin);
        if !wedge_contains(&dy, &dz, &away) {
            continue;
        }
        let (capped, rest) = if dz.dot(&cap.dir) <= dy.dot(&cap.dir) {
            ([cap.right, cap.left, z], [cap.left, y, z])
        } else {
            ([cap.right, cap.left, y], [cap.right, y, z])
        };
        triangles[t] = rest;
        face_triangles.entry(cap.face).or_default().push(triangles.len());
        triangles.push(capped);
        return;
    }
}

/// Inserts the triangles and connects them across shared sides; unshared
/// sides must lie on wavefront edges.
fn link_triangles(mesh: &mut KineticMesh, triangles: &[[VertexKey; 3]], log: &mut ErrorLog) {
    let keys: Vec<TriangleKey> = triangles
        .iter()
        .map(|&t| mesh.triangles.insert(KineticTriangle::new(t)))
        .collect();
    let mut sides: HashMap<(VertexKey, VertexKey), TriangleKey> = HashMap::new();
    for (&k, t) in keys.iter().zip(triangles) {
        for i in 0..3 {
            sides.insert((t[(i + 1) % 3], t[(i + 2) % 3]), k);
        }
    }
    let edge_by_ends: HashMap<(VertexKey, VertexKey), EdgeKey> = mesh
        .edges
        .iter()
        .map(|(k, e)| ((e.start, e.end), k))
        .collect();

    let mut unmatched = 0;
    for (&k, t) in keys.iter().zip(triangles) {
        for i in 0..3 {
            let (a, b) = (t[(i + 1) % 3], t[(i + 2) % 3]);
            if let Some(&n) = sides.get(&(b, a)) {
                mesh.triangles[k].neighbors[i] = Some(n);
            } else if let Some(&e) = edge_by_ends.get(&(a, b)) {
                mesh.triangles[k].wavefront[i] = Some(e);
            } else {
                unmatched += 1;
            }
        }
    }
    if unmatched > 0 {
        log.error(format!("{unmatched} kinetic triangle sides have no neighbour"));
    }
}
