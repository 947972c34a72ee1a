use super::point::PointId;

slotmap::new_key_type! {
    /// Unique identifier for a primitive in a [`Detail`](super::Detail).
    pub struct PrimId;
}

/// The kind of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimKind {
    /// A closed polygon; the last vertex connects back to the first.
    Polygon,
    /// An open polyline.
    Polyline,
}

/// Data associated with a primitive.
///
/// Vertices are the entries of `points`; vertex `i` of a primitive
/// references point `points[i]`.
#[derive(Debug, Clone)]
pub struct PrimData {
    /// Whether the primitive is closed.
    pub kind: PrimKind,
    /// The points referenced by each vertex, in order.
    pub points: Vec<PointId>,
}

impl PrimData {
    /// Creates a new primitive.
    #[must_use]
    pub fn new(kind: PrimKind, points: Vec<PointId>) -> Self {
        Self { kind, points }
    }

    /// Returns `true` for closed polygons.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.kind == PrimKind::Polygon
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    /// Number of edges (segments between consecutive vertices).
    #[must_use]
    pub fn edge_count(&self) -> usize {
        let n = self.points.len();
        match self.kind {
            PrimKind::Polygon if n >= 3 => n,
            PrimKind::Polyline if n >= 2 => n - 1,
            _ => 0,
        }
    }

    /// Iterates the edges as `(start vertex index, start point, end point)`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, PointId, PointId)> + '_ {
        let n = self.points.len();
        (0..self.edge_count()).map(move |i| (i, self.points[i], self.points[(i + 1) % n]))
    }
}
