pub mod attribute;
pub mod point;
pub mod primitive;

pub use attribute::{AttribOwner, ScalarAttribute, VertexAttribute};
pub use point::{PointData, PointId};
pub use primitive::{PrimData, PrimId, PrimKind};

use std::collections::BTreeMap;

use slotmap::{SecondaryMap, SlotMap};

use crate::error::{DetailError, Result};
use crate::math::{Point3, Vector3};

/// Geometry container holding points, polygon/polyline primitives, named
/// scalar attributes, point normals and named groups.
///
/// Entities reference each other via typed IDs (generational indices).
/// Iteration follows insertion order as long as nothing was removed.
#[derive(Debug, Default)]
pub struct Detail {
    points: SlotMap<PointId, PointData>,
    prims: SlotMap<PrimId, PrimData>,
    vertex_attribs: BTreeMap<String, VertexAttribute<PrimId>>,
    point_attribs: BTreeMap<String, ScalarAttribute<PointId>>,
    prim_attribs: BTreeMap<String, ScalarAttribute<PrimId>>,
    normals: SecondaryMap<PointId, Vector3>,
    point_groups: BTreeMap<String, SecondaryMap<PointId, ()>>,
    prim_groups: BTreeMap<String, SecondaryMap<PrimId, ()>>,
}

impl Detail {
    /// Creates a new, empty detail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Point operations ---

    /// Inserts a point and returns its ID.
    pub fn add_point(&mut self, position: Point3) -> PointId {
        self.points.insert(PointData::new(position))
    }

    /// Returns a reference to the point data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the point is not in the detail.
    pub fn point(&self, id: PointId) -> Result<&PointData> {
        self.points
            .get(id)
            .ok_or_else(|| DetailError::EntityNotFound("point".into()).into())
    }

    /// Iterates all points.
    pub fn points(&self) -> impl Iterator<Item = (PointId, &PointData)> {
        self.points.iter()
    }

    /// Number of points.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    // --- Primitive operations ---

    /// Inserts a primitive and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns `DetailError::InvalidPrimitive` if the primitive references a
    /// missing point or has too few vertices for its kind.
    pub fn add_prim(&mut self, kind: PrimKind, points: Vec<PointId>) -> Result<PrimId> {
        let min = match kind {
            PrimKind::Polygon => 3,
            PrimKind::Polyline => 2,
        };
        if points.len() < min {
            return Err(DetailError::InvalidPrimitive(format!(
                "{kind:?} needs at least {min} vertices, got {}",
                points.len()
            ))
            .into());
        }
        if let Some(missing) = points.iter().find(|&&p| !self.points.contains_key(p)) {
            return Err(
                DetailError::InvalidPrimitive(format!("unknown point {missing:?}")).into(),
            );
        }
        Ok(self.prims.insert(PrimData::new(kind, points)))
    }

    /// Adds points at `positions` and a closed polygon through them.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 3 positions are given.
    pub fn add_polygon(&mut self, positions: &[Point3]) -> Result<PrimId> {
        let points = positions.iter().map(|&p| self.add_point(p)).collect();
        self.add_prim(PrimKind::Polygon, points)
    }

    /// Adds points at `positions` and an open polyline through them.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 2 positions are given.
    pub fn add_polyline(&mut self, positions: &[Point3]) -> Result<PrimId> {
        let points = positions.iter().map(|&p| self.add_point(p)).collect();
        self.add_prim(PrimKind::Polyline, points)
    }

    /// Returns a reference to the primitive data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the primitive is not in the detail.
    pub fn prim(&self, id: PrimId) -> Result<&PrimData> {
        self.prims
            .get(id)
            .ok_or_else(|| DetailError::EntityNotFound("primitive".into()).into())
    }

    /// Iterates all primitives.
    pub fn prims(&self) -> impl Iterator<Item = (PrimId, &PrimData)> {
        self.prims.iter()
    }

    /// Number of primitives.
    #[must_use]
    pub fn prim_count(&self) -> usize {
        self.prims.len()
    }

    /// Removes a primitive together with its attribute values and group
    /// memberships. Its points are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the primitive is not in the detail.
    pub fn remove_prim(&mut self, id: PrimId) -> Result<PrimData> {
        let data = self
            .prims
            .remove(id)
            .ok_or_else(|| DetailError::EntityNotFound("primitive".into()))?;
        for attr in self.vertex_attribs.values_mut() {
            attr.remove(id);
        }
        for attr in self.prim_attribs.values_mut() {
            attr.remove(id);
        }
        for group in self.prim_groups.values_mut() {
            group.remove(id);
        }
        Ok(data)
    }

    /// Removes those of `candidates` that no primitive references. Returns
    /// the number of points removed.
    pub fn remove_orphan_points(&mut self, candidates: &[PointId]) -> usize {
        let mut used: SecondaryMap<PointId, ()> = SecondaryMap::new();
        for prim in self.prims.values() {
            for &p in &prim.points {
                used.insert(p, ());
            }
        }
        let mut orphans: Vec<PointId> = candidates
            .iter()
            .copied()
            .filter(|&p| self.points.contains_key(p) && !used.contains_key(p))
            .collect();
        orphans.sort_unstable();
        orphans.dedup();
        for &p in &orphans {
            self.points.remove(p);
            self.normals.remove(p);
            for attr in self.point_attribs.values_mut() {
                attr.remove(p);
            }
            for group in self.point_groups.values_mut() {
                group.remove(p);
            }
        }
        orphans.len()
    }

    // --- Attribute operations ---

    /// Creates (or resets the default of) an attribute.
    pub fn add_attrib(&mut self, owner: AttribOwner, name: &str, default: f64) {
        match owner {
            AttribOwner::Vertex => {
                self.vertex_attribs
                    .insert(name.to_owned(), VertexAttribute::new(default));
            }
            AttribOwner::Point => {
                self.point_attribs
                    .insert(name.to_owned(), ScalarAttribute::new(default));
            }
            AttribOwner::Primitive => {
                self.prim_attribs
                    .insert(name.to_owned(), ScalarAttribute::new(default));
            }
        }
    }

    /// Returns `true` if an attribute named `name` exists on `owner`.
    #[must_use]
    pub fn has_attrib(&self, owner: AttribOwner, name: &str) -> bool {
        match owner {
            AttribOwner::Vertex => self.vertex_attribs.contains_key(name),
            AttribOwner::Point => self.point_attribs.contains_key(name),
            AttribOwner::Primitive => self.prim_attribs.contains_key(name),
        }
    }

    /// Sets a point attribute value, creating the attribute (default 0) if needed.
    pub fn set_point_attrib(&mut self, name: &str, point: PointId, value: f64) {
        self.point_attribs
            .entry(name.to_owned())
            .or_insert_with(|| ScalarAttribute::new(0.0))
            .set(point, value);
    }

    /// Reads a point attribute, or `None` if no such attribute exists.
    #[must_use]
    pub fn point_attrib(&self, name: &str, point: PointId) -> Option<f64> {
        self.point_attribs.get(name).map(|a| a.get(point))
    }

    /// Sets a primitive attribute value, creating the attribute (default 0) if needed.
    pub fn set_prim_attrib(&mut self, name: &str, prim: PrimId, value: f64) {
        self.prim_attribs
            .entry(name.to_owned())
            .or_insert_with(|| ScalarAttribute::new(0.0))
            .set(prim, value);
    }

    /// Reads a primitive attribute, or `None` if no such attribute exists.
    #[must_use]
    pub fn prim_attrib(&self, name: &str, prim: PrimId) -> Option<f64> {
        self.prim_attribs.get(name).map(|a| a.get(prim))
    }

    /// Sets a vertex attribute value, creating the attribute (default 0) if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the primitive does not exist or `index` is out of range.
    pub fn set_vertex_attrib(
        &mut self,
        name: &str,
        prim: PrimId,
        index: usize,
        value: f64,
    ) -> Result<()> {
        let count = self.prim(prim)?.vertex_count();
        if index >= count {
            return Err(DetailError::EntityNotFound(format!(
                "vertex {index} of a {count}-vertex primitive"
            ))
            .into());
        }
        self.vertex_attribs
            .entry(name.to_owned())
            .or_insert_with(|| VertexAttribute::new(0.0))
            .set(prim, count, index, value);
        Ok(())
    }

    /// Reads a vertex attribute, or `None` if no such attribute exists.
    #[must_use]
    pub fn vertex_attrib(&self, name: &str, prim: PrimId, index: usize) -> Option<f64> {
        self.vertex_attribs.get(name).map(|a| a.get(prim, index))
    }

    /// Names of all attributes on `owner`.
    #[must_use]
    pub fn attrib_names(&self, owner: AttribOwner) -> Vec<&str> {
        match owner {
            AttribOwner::Vertex => self.vertex_attribs.keys().map(String::as_str).collect(),
            AttribOwner::Point => self.point_attribs.keys().map(String::as_str).collect(),
            AttribOwner::Primitive => self.prim_attribs.keys().map(String::as_str).collect(),
        }
    }

    // --- Normals ---

    /// Sets the normal of a point.
    pub fn set_normal(&mut self, point: PointId, normal: Vector3) {
        self.normals.insert(point, normal);
    }

    /// Returns the normal of a point, if one was set.
    #[must_use]
    pub fn normal(&self, point: PointId) -> Option<Vector3> {
        self.normals.get(point).copied()
    }

    // --- Group operations ---

    /// Creates an empty point group if it does not exist yet.
    pub fn create_point_group(&mut self, name: &str) {
        self.point_groups.entry(name.to_owned()).or_default();
    }

    /// Creates an empty primitive group if it does not exist yet.
    pub fn create_prim_group(&mut self, name: &str) {
        self.prim_groups.entry(name.to_owned()).or_default();
    }

    /// Adds a point to a group, creating the group if needed.
    pub fn add_to_point_group(&mut self, name: &str, point: PointId) {
        self.point_groups
            .entry(name.to_owned())
            .or_default()
            .insert(point, ());
    }

    /// Adds a primitive to a group, creating the group if needed.
    pub fn add_to_prim_group(&mut self, name: &str, prim: PrimId) {
        self.prim_groups
            .entry(name.to_owned())
            .or_default()
            .insert(prim, ());
    }

    /// Members of a point group.
    ///
    /// # Errors
    ///
    /// Returns `DetailError::UnknownGroup` if no such group exists.
    pub fn point_group(&self, name: &str) -> Result<Vec<PointId>> {
        let group = self
            .point_groups
            .get(name)
            .ok_or_else(|| DetailError::UnknownGroup(name.to_owned()))?;
        Ok(self.points.keys().filter(|&p| group.contains_key(p)).collect())
    }

    /// Members of a primitive group.
    ///
    /// # Errors
    ///
    /// Returns `DetailError::UnknownGroup` if no such group exists.
    pub fn prim_group(&self, name: &str) -> Result<Vec<PrimId>> {
        let group = self
            .prim_groups
            .get(name)
            .ok_or_else(|| DetailError::UnknownGroup(name.to_owned()))?;
        Ok(self.prims.keys().filter(|&p| group.contains_key(p)).collect())
    }

    /// Returns `true` if the primitive belongs to the named group.
    #[must_use]
    pub fn prim_in_group(&self, name: &str, prim: PrimId) -> bool {
        self.prim_groups
            .get(name)
            .is_some_and(|g| g.contains_key(prim))
    }

    /// Names of the primitive groups containing `prim`.
    #[must_use]
    pub fn prim_groups_of(&self, prim: PrimId) -> Vec<&str> {
        self.prim_groups
            .iter()
            .filter(|(_, g)| g.contains_key(prim))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The points of a group, or all points when `group` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `DetailError::UnknownGroup` for an unknown group name.
    pub fn points_in(&self, group: Option<&str>) -> Result<Vec<PointId>> {
        match group {
            Some(name) => self.point_group(name),
            None => Ok(self.points.keys().collect()),
        }
    }

    /// The primitives of a group, or all primitives when `group` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `DetailError::UnknownGroup` for an unknown group name.
    pub fn prims_in(&self, group: Option<&str>) -> Result<Vec<PrimId>> {
        match group {
            Some(name) => self.prim_group(name),
            None => Ok(self.prims.keys().collect()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square(detail: &mut Detail) -> PrimId {
        detail
            .add_polygon(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])
            .unwrap()
    }

    #[test]
    fn add_and_query_primitive() {
        let mut detail = Detail::new();
        let prim = square(&mut detail);
        assert_eq!(detail.point_count(), 4);
        assert_eq!(detail.prim_count(), 1);
        let data = detail.prim(prim).unwrap();
        assert!(data.is_closed());
        assert_eq!(data.edges().count(), 4);
    }

    #[test]
    fn rejects_short_polygon() {
        let mut detail = Detail::new();
        assert!(detail
            .add_polygon(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)])
            .is_err());
    }

    #[test]
    fn open_polyline_edges() {
        let mut detail = Detail::new();
        let prim = detail
            .add_polyline(&[
                Point3::origin(),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 1.0, 0.0),
            ])
            .unwrap();
        assert_eq!(detail.prim(prim).unwrap().edges().count(), 2);
    }

    #[test]
    fn attributes_read_defaults_and_overrides() {
        let mut detail = Detail::new();
        let prim = square(&mut detail);
        assert!(detail.prim_attrib("speed", prim).is_none());
        detail.add_attrib(AttribOwner::Primitive, "speed", 1.0);
        assert_eq!(detail.prim_attrib("speed", prim), Some(1.0));
        detail.set_vertex_attrib("speed", prim, 2, 3.0).unwrap();
        assert_eq!(detail.vertex_attrib("speed", prim, 2), Some(3.0));
        assert_eq!(detail.vertex_attrib("speed", prim, 1), Some(0.0));
        assert!(detail.set_vertex_attrib("speed", prim, 4, 3.0).is_err());
    }

    #[test]
    fn groups_and_removal() {
        let mut detail = Detail::new();
        let a = square(&mut detail);
        let b = square(&mut detail);
        detail.add_to_prim_group("input", a);
        detail.add_to_prim_group("input", b);
        assert_eq!(detail.prim_group("input").unwrap(), vec![a, b]);
        assert!(detail.prim_group("missing").is_err());

        let loose = detail.add_point(Point3::new(5.0, 5.0, 0.0));
        let removed = detail.remove_prim(a).unwrap();
        assert_eq!(detail.prim_group("input").unwrap(), vec![b]);
        assert_eq!(detail.remove_orphan_points(&removed.points), 4);
        assert_eq!(detail.point_count(), 5);
        assert!(detail.point(loose).is_ok());
    }

    #[test]
    fn point_groups_filter_points_in() {
        let mut detail = Detail::new();
        let a = detail.add_point(Point3::new(0.0, 0.0, 0.0));
        let b = detail.add_point(Point3::new(1.0, 0.0, 0.0));
        detail.create_point_group("empty");
        detail.add_to_point_group("picked", b);

        assert!(detail.point_group("empty").unwrap().is_empty());
        assert_eq!(detail.points_in(Some("picked")).unwrap(), vec![b]);
        assert_eq!(detail.points_in(None).unwrap(), vec![a, b]);
        assert!(detail.points_in(Some("missing")).is_err());
    }
}
