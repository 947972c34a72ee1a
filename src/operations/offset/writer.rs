use crate::detail::{Detail, PointId, PrimId, PrimKind};
use crate::error::Result;
use crate::geometry::ProjectionPlane;
use crate::math::Point2;
use crate::skeleton::Side;

use super::BuildOffsetGeometry;

/// Writes offset points and primitives into a detail, applying the
/// builder's attribute, normal and group settings.
pub(super) struct OffsetWriter<'a> {
    detail: &'a mut Detail,
    plane: &'a ProjectionPlane,
    op: &'a BuildOffsetGeometry,
}

impl<'a> OffsetWriter<'a> {
    pub(super) fn new(
        detail: &'a mut Detail,
        plane: &'a ProjectionPlane,
        op: &'a BuildOffsetGeometry,
    ) -> Self {
        Self { detail, plane, op }
    }

    pub(super) fn op(&self) -> &BuildOffsetGeometry {
        self.op
    }

    /// Adds a point at plane position `p`, sampled at propagation `time`.
    pub(super) fn add_point(&mut self, p: &Point2, time: f64) -> PointId {
        let id = self.detail.add_point(self.plane.to_3d(p));
        if let Some(name) = self.op.edge_dist_attrib() {
            self.detail.set_point_attrib(name, id, time);
        }
        if self.op.update_point_normals() {
            self.detail.set_normal(id, *self.plane.normal());
        }
        id
    }

    /// Adds a primitive over `points` and files it into the side's group.
    pub(super) fn add_prim(
        &mut self,
        kind: PrimKind,
        points: Vec<PointId>,
        side: Side,
    ) -> Result<PrimId> {
        let prim = self.detail.add_prim(kind, points)?;
        if let Some(group) = self.op.group_for(side) {
            self.detail.add_to_prim_group(group, prim);
        }
        Ok(prim)
    }

    /// Records the speed of each vertex's edge on a curve primitive.
    pub(super) fn set_vertex_speeds(&mut self, prim: PrimId, speeds: &[f64]) -> Result<()> {
        let Some(name) = self.op.edge_speed_attrib() else {
            return Ok(());
        };
        for (i, &speed) in speeds.iter().enumerate() {
            self.detail.set_vertex_attrib(name, prim, i, speed)?;
        }
        Ok(())
    }

    /// Records the speed of the edge a surface primitive was swept by.
    pub(super) fn set_prim_speed(&mut self, prim: PrimId, speed: f64) {
        if let Some(name) = self.op.edge_speed_attrib() {
            self.detail.set_prim_attrib(name, prim, speed);
        }
    }
}
