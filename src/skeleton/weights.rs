use crate::detail::{AttribOwner, Detail, PointId, PrimId};

/// Smallest speed a weighted wavefront edge may move at.
pub const MIN_WEIGHT: f64 = 1e-3;

/// Resolves per-edge wavefront speeds from a named attribute.
///
/// The attribute is looked up on vertices first, then points, then
/// primitives; the first class that has an attribute of that name wins.
/// Without a name, or when no class carries it, every edge moves at speed 1.
#[derive(Debug, Clone, Copy)]
pub struct WeightLookup<'a> {
    detail: &'a Detail,
    name: Option<&'a str>,
    owner: Option<AttribOwner>,
}

impl<'a> WeightLookup<'a> {
    /// Resolves which attribute class provides `name`.
    #[must_use]
    pub fn new(detail: &'a Detail, name: Option<&'a str>) -> Self {
        let owner = name.and_then(|name| {
            [AttribOwner::Vertex, AttribOwner::Point, AttribOwner::Primitive]
                .into_iter()
                .find(|&owner| detail.has_attrib(owner, name))
        });
        Self {
            detail,
            name,
            owner,
        }
    }

    /// The attribute class the weights are read from, if any.
    #[must_use]
    pub fn owner(&self) -> Option<AttribOwner> {
        self.owner
    }

    /// Speed of the edge starting at vertex `vertex` (referencing `point`) of `prim`.
    #[must_use]
    pub fn edge_weight(&self, prim: PrimId, vertex: usize, point: PointId) -> f64 {
        let (Some(name), Some(owner)) = (self.name, self.owner) else {
            return 1.0;
        };
        let raw = match owner {
            AttribOwner::Vertex => self.detail.vertex_attrib(name, prim, vertex),
            AttribOwner::Point => self.detail.point_attrib(name, point),
            AttribOwner::Primitive => self.detail.prim_attrib(name, prim),
        };
        sanitize_weight(raw.unwrap_or(1.0))
    }
}

/// Maps a raw attribute value to a usable wavefront speed.
///
/// Zero, negative and non-finite weights fall back to 1; tiny positive
/// weights are clamped to [`MIN_WEIGHT`].
#[must_use]
pub fn sanitize_weight(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= 0.0 {
        1.0
    } else {
        raw.max(MIN_WEIGHT)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point3;

    fn triangle(detail: &mut Detail) -> PrimId {
        detail
            .add_polygon(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])
            .unwrap()
    }

    #[test]
    fn defaults_to_unit_speed() {
        let mut detail = Detail::new();
        let prim = triangle(&mut detail);
        let point = detail.prim(prim).unwrap().points[0];
        let lookup = WeightLookup::new(&detail, None);
        assert!((lookup.edge_weight(prim, 0, point) - 1.0).abs() < f64::EPSILON);
        let lookup = WeightLookup::new(&detail, Some("missing"));
        assert!(lookup.owner().is_none());
        assert!((lookup.edge_weight(prim, 0, point) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn vertex_beats_point_beats_primitive() {
        let mut detail = Detail::new();
        let prim = triangle(&mut detail);
        let point = detail.prim(prim).unwrap().points[1];
        detail.set_prim_attrib("w", prim, 2.0);
        assert_eq!(WeightLookup::new(&detail, Some("w")).owner(), Some(AttribOwner::Primitive));
        detail.set_point_attrib("w", point, 3.0);
        let lookup = WeightLookup::new(&detail, Some("w"));
        assert_eq!(lookup.owner(), Some(AttribOwner::Point));
        assert!((lookup.edge_weight(prim, 1, point) - 3.0).abs() < f64::EPSILON);
        detail.set_vertex_attrib("w", prim, 1, 4.0).unwrap();
        let lookup = WeightLookup::new(&detail, Some("w"));
        assert_eq!(lookup.owner(), Some(AttribOwner::Vertex));
        assert!((lookup.edge_weight(prim, 1, point) - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_weights_fall_back() {
        assert!((sanitize_weight(0.0) - 1.0).abs() < f64::EPSILON);
        assert!((sanitize_weight(-3.0) - 1.0).abs() < f64::EPSILON);
        assert!((sanitize_weight(f64::NAN) - 1.0).abs() < f64::EPSILON);
        assert!((sanitize_weight(1e-9) - MIN_WEIGHT).abs() < f64::EPSILON);
        assert!((sanitize_weight(2.5) - 2.5).abs() < f64::EPSILON);
    }
}
