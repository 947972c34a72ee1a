use std::collections::HashMap;

use spade::handles::FixedVertexHandle;
use spade::Triangulation;

use crate::detail::{AttribOwner, Detail, PrimId, PrimKind};
use crate::error::Result;
use crate::geometry::ProjectionPlane;
use crate::math::fit::fit_plane;
use crate::math::polygon_2d::{is_convex, point_in_polygon, signed_area};
use crate::math::{Point2, Point3};
use crate::skeleton::classify::{insert, to_point, Cdt};

/// Splits closed polygons into convex pieces with at most `max_sides` sides.
///
/// Each polygon that is not convex, or has too many sides, is triangulated
/// in its best-fit plane and the triangles are greedily merged back
/// together while the merged piece stays convex and small enough
/// (Hertel–Mehlhorn). Pieces keep the winding, vertex attributes, primitive
/// attributes and groups of the polygon they came from.
pub struct ConvexPolygons {
    max_sides: usize,
    group: Option<String>,
    keep_triangles: bool,
}

/// Outcome of a [`ConvexPolygons`] run.
#[derive(Debug, Clone, Default)]
pub struct ConvexResult {
    /// Number of input polygons that were replaced.
    pub split: usize,
    /// The pieces that replaced them.
    pub created: Vec<PrimId>,
    /// Polygons left alone because they are degenerate or self-intersecting.
    pub skipped: usize,
}

impl ConvexPolygons {
    /// Creates the operation. `max_sides` below 3 is raised to 3.
    #[must_use]
    pub fn new(max_sides: usize) -> Self {
        Self {
            max_sides: max_sides.max(3),
            group: None,
            keep_triangles: false,
        }
    }

    /// Only processes the primitives of `group`.
    #[must_use]
    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_owned());
        self
    }

    /// Emits the raw triangulation instead of merging triangles back.
    #[must_use]
    pub fn keep_triangles(mut self, keep: bool) -> Self {
        self.keep_triangles = keep;
        self
    }

    /// Runs the operation on `detail`.
    ///
    /// # Errors
    ///
    /// Returns an error if the group does not exist or the triangulator
    /// rejects a point.
    pub fn execute(&self, detail: &mut Detail) -> Result<ConvexResult> {
        let mut result = ConvexResult::default();
        for prim in detail.prims_in(self.group.as_deref())? {
            let data = detail.prim(prim)?;
            if data.kind != PrimKind::Polygon {
                continue;
            }
            let positions: Vec<Point3> = data
                .points
                .iter()
                .map(|&p| detail.point(p).map(|d| d.position))
                .collect::<Result<_>>()?;

            let Some(plane) = fit_plane(&positions)
                .and_then(|(normal, distance)| ProjectionPlane::new(normal, distance).ok())
            else {
                result.skipped += 1;
                continue;
            };
            let flat: Vec<Point2> = positions.iter().map(|p| plane.to_2d(p)).collect();
            if flat.len() <= self.max_sides && is_convex(&flat) {
                continue;
            }

            let Some(pieces) = self.decompose(&flat)? else {
                tracing::warn!(vertices = flat.len(), "self-intersecting polygon left unsplit");
                result.skipped += 1;
                continue;
            };
            result.created.extend(replace_prim(detail, prim, &pieces)?);
            result.split += 1;
        }
        tracing::debug!(
            split = result.split,
            created = result.created.len(),
            skipped = result.skipped,
            "convexed polygons"
        );
        Ok(result)
    }

    /// Convex pieces of `flat` as loops of vertex indices, in the polygon's
    /// winding. `None` if its edges cross.
    fn decompose(&self, flat: &[Point2]) -> Result<Option<Vec<Vec<usize>>>> {
        let mut cdt = Cdt::new();
        let mut handles = Vec::with_capacity(flat.len());
        let mut vertex_of: HashMap<FixedVertexHandle, usize> = HashMap::new();
        for (i, p) in flat.iter().enumerate() {
            let h = insert(&mut cdt, p)?;
            vertex_of.entry(h).or_insert(i);
            handles.push(h);
        }
        for i in 0..handles.len() {
            let (a, b) = (handles[i], handles[(i + 1) % handles.len()]);
            if a == b {
                continue;
            }
            let present = cdt
                .get_edge_from_neighbors(a, b)
                .is_some_and(|e| cdt.is_constraint_edge(e.as_undirected().fix()));
            if !present {
                if !cdt.can_add_constraint(a, b) {
                    return Ok(None);
                }
                cdt.add_constraint(a, b);
            }
        }

        let mut pieces: Vec<Vec<usize>> = Vec::new();
        for face in cdt.inner_faces() {
            let vertices = face.vertices();
            let center = vertices
                .iter()
                .fold(Point2::origin(), |acc, v| acc + to_point(v.position()).coords / 3.0);
            if !point_in_polygon(&center, flat) {
                continue;
            }
            let loop_: Option<Vec<usize>> =
                vertices.iter().map(|v| vertex_of.get(&v.fix()).copied()).collect();
            if let Some(loop_) = loop_ {
                pieces.push(loop_);
            }
        }

        if !self.keep_triangles {
            pieces = merge_pieces(pieces, flat, self.max_sides);
        }
        if signed_area(flat) < 0.0 {
            for piece in &mut pieces {
                piece.reverse();
            }
        }
        Ok(Some(pieces))
    }
}

/// Greedy Hertel–Mehlhorn merging of counter-clockwise pieces across shared
/// diagonals.
fn merge_pieces(pieces: Vec<Vec<usize>>, flat: &[Point2], max_sides: usize) -> Vec<Vec<usize>> {
    let mut pieces: Vec<Option<Vec<usize>>> = pieces.into_iter().map(Some).collect();
    let mut owner: HashMap<(usize, usize), usize> = HashMap::new();
    for (k, piece) in pieces.iter().enumerate() {
        if let Some(piece) = piece {
            for (a, b) in directed_edges(piece) {
                owner.insert((a, b), k);
            }
        }
    }

    let mut diagonals: Vec<(usize, usize)> = owner
        .keys()
        .copied()
        .filter(|&(a, b)| a < b && owner.contains_key(&(b, a)))
        .collect();
    diagonals.sort_unstable();

    for (a, b) in diagonals {
        let (Some(&p), Some(&q)) = (owner.get(&(a, b)), owner.get(&(b, a))) else {
            continue;
        };
        if p == q {
            continue;
        }
        let (Some(first), Some(second)) = (pieces[p].as_ref(), pieces[q].as_ref()) else {
            continue;
        };
        let merged = join_across(first, second, a, b);
        if merged.len() > max_sides {
            continue;
        }
        let points: Vec<Point2> = merged.iter().map(|&i| flat[i]).collect();
        if !is_convex(&points) {
            continue;
        }
        for edge in directed_edges(&merged) {
            owner.insert(edge, p);
        }
        owner.remove(&(a, b));
        owner.remove(&(b, a));
        pieces[p] = Some(merged);
        pieces[q] = None;
    }
    pieces.into_iter().flatten().collect()
}

/// Joins `first` (containing `a → b`) and `second` (containing `b → a`).
fn join_across(first: &[usize], second: &[usize], a: usize, b: usize) -> Vec<usize> {
    let rotated = |piece: &[usize], start: usize| -> Vec<usize> {
        let at = piece.iter().position(|&v| v == start).unwrap_or(0);
        piece[at..].iter().chain(&piece[..at]).copied().collect()
    };
    // [b, .., a] followed by the inner vertices of [a, .., b].
    let mut merged = rotated(first, b);
    let tail = rotated(second, a);
    merged.extend(tail.iter().skip(1).take(tail.len().saturating_sub(2)));
    merged
}

fn directed_edges(piece: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    (0..piece.len()).map(move |i| (piece[i], piece[(i + 1) % piece.len()]))
}

/// Replaces `prim` by polygons over the vertex index loops in `pieces`.
fn replace_prim(detail: &mut Detail, prim: PrimId, pieces: &[Vec<usize>]) -> Result<Vec<PrimId>> {
    let source = detail.prim(prim)?.points.clone();
    let vertex_attribs: Vec<String> = detail
        .attrib_names(AttribOwner::Vertex)
        .into_iter()
        .map(str::to_owned)
        .collect();
    let prim_attribs: Vec<(String, f64)> = detail
        .attrib_names(AttribOwner::Primitive)
        .into_iter()
        .filter_map(|name| detail.prim_attrib(name, prim).map(|v| (name.to_owned(), v)))
        .collect();
    let groups: Vec<String> = detail
        .prim_groups_of(prim)
        .into_iter()
        .map(str::to_owned)
        .collect();
    let vertex_values: Vec<Vec<Option<f64>>> = vertex_attribs
        .iter()
        .map(|name| {
            (0..source.len())
                .map(|i| detail.vertex_attrib(name, prim, i))
                .collect()
        })
        .collect();

    let mut created = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let points = piece.iter().map(|&i| source[i]).collect();
        let new = detail.add_prim(PrimKind::Polygon, points)?;
        for (name, values) in vertex_attribs.iter().zip(&vertex_values) {
            for (slot, &i) in piece.iter().enumerate() {
                if let Some(value) = values[i] {
                    detail.set_vertex_attrib(name, new, slot, value)?;
                }
            }
        }
        for (name, value) in &prim_attribs {
            detail.set_prim_attrib(name, new, *value);
        }
        for group in &groups {
            detail.add_to_prim_group(group, new);
        }
        created.push(new);
    }
    detail.remove_prim(prim)?;
    Ok(created)
}
