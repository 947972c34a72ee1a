use crate::detail::{Detail, PrimId};
use crate::error::{OperationError, Result};
use crate::math::TOLERANCE;
use crate::skeleton::{Side, StraightSkeleton};

use super::writer::OffsetWriter;
use super::{curves, surfaces};

/// What [`BuildOffsetGeometry`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetGeoType {
    /// The wavefront at each sampled time, as polygons or polylines.
    #[default]
    OffsetCurves,
    /// The ribbon swept by the wavefront between consecutive sampled times.
    OffsetSurfaces,
}

/// Primitives written by one [`BuildOffsetGeometry`] run.
#[derive(Debug, Clone, Default)]
pub struct OffsetResult {
    pub inside_prims: Vec<PrimId>,
    pub outside_prims: Vec<PrimId>,
    /// Number of input primitives deleted because `keep_input` was off.
    pub removed_input: usize,
}

/// Builds offset curves or surfaces from a computed skeleton.
///
/// `distance` is a propagation time: with unit weights it equals the
/// Euclidean offset, with weights each edge has moved `weight * distance`.
/// The interval `[0, distance]` is sampled at `ndivs` evenly spaced times.
#[derive(Debug, Clone)]
pub struct BuildOffsetGeometry {
    geo_type: OffsetGeoType,
    distance: f64,
    ndivs: usize,
    inside: bool,
    outside: bool,
    keep_input: bool,
    input_group: Option<String>,
    inside_group: Option<String>,
    outside_group: Option<String>,
    split_curves_to_omit_end_caps: bool,
    edge_dist_attrib: Option<String>,
    edge_speed_attrib: Option<String>,
    update_point_normals: bool,
}

impl BuildOffsetGeometry {
    /// Creates a builder for the inside wavefront with one division.
    #[must_use]
    pub fn new(geo_type: OffsetGeoType, distance: f64) -> Self {
        Self {
            geo_type,
            distance,
            ndivs: 1,
            inside: true,
            outside: false,
            keep_input: true,
            input_group: None,
            inside_group: None,
            outside_group: None,
            split_curves_to_omit_end_caps: false,
            edge_dist_attrib: None,
            edge_speed_attrib: None,
            update_point_normals: true,
        }
    }

    #[must_use]
    pub fn with_ndivs(mut self, ndivs: usize) -> Self {
        self.ndivs = ndivs;
        self
    }

    #[must_use]
    pub fn with_inside(mut self, inside: bool) -> Self {
        self.inside = inside;
        self
    }

    #[must_use]
    pub fn with_outside(mut self, outside: bool) -> Self {
        self.outside = outside;
        self
    }

    /// Keeps or deletes the skeleton's input primitives.
    #[must_use]
    pub fn with_keep_input(mut self, keep_input: bool) -> Self {
        self.keep_input = keep_input;
        self
    }

    /// Restricts input deletion to the primitives of `group`.
    #[must_use]
    pub fn with_input_group(mut self, group: &str) -> Self {
        self.input_group = Some(group.to_owned());
        self
    }

    #[must_use]
    pub fn with_inside_group(mut self, group: &str) -> Self {
        self.inside_group = Some(group.to_owned());
        self
    }

    #[must_use]
    pub fn with_outside_group(mut self, group: &str) -> Self {
        self.outside_group = Some(group.to_owned());
        self
    }

    /// Drops cap edges from offset curves, leaving open polylines where the
    /// wavefront wrapped around a dangling endpoint.
    #[must_use]
    pub fn with_split_curves_to_omit_end_caps(mut self, split: bool) -> Self {
        self.split_curves_to_omit_end_caps = split;
        self
    }

    /// Point attribute receiving the sample time of each new point.
    #[must_use]
    pub fn with_edge_dist_attrib(mut self, name: &str) -> Self {
        self.edge_dist_attrib = Some(name.to_owned());
        self
    }

    /// Attribute receiving the weight of the edge each piece came from.
    #[must_use]
    pub fn with_edge_speed_attrib(mut self, name: &str) -> Self {
        self.edge_speed_attrib = Some(name.to_owned());
        self
    }

    /// Writes the plane normal to every new point (on by default).
    #[must_use]
    pub fn with_update_point_normals(mut self, update: bool) -> Self {
        self.update_point_normals = update;
        self
    }

    #[must_use]
    pub fn geo_type(&self) -> OffsetGeoType {
        self.geo_type
    }

    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    #[must_use]
    pub fn ndivs(&self) -> usize {
        self.ndivs
    }

    /// Sample times `distance * k / ndivs` for `k = 0..=ndivs`.
    #[allow(clippy::cast_precision_loss)]
    pub(super) fn sample_times(&self) -> Vec<f64> {
        (0..=self.ndivs)
            .map(|k| self.distance * k as f64 / self.ndivs as f64)
            .collect()
    }

    pub(super) fn split_caps(&self) -> bool {
        self.split_curves_to_omit_end_caps
    }

    pub(super) fn edge_dist_attrib(&self) -> Option<&str> {
        self.edge_dist_attrib.as_deref()
    }

    pub(super) fn edge_speed_attrib(&self) -> Option<&str> {
        self.edge_speed_attrib.as_deref()
    }

    pub(super) fn update_point_normals(&self) -> bool {
        self.update_point_normals
    }

    pub(super) fn group_for(&self, side: Side) -> Option<&str> {
        match side {
            Side::Inside => self.inside_group.as_deref(),
            Side::Outside => self.outside_group.as_deref(),
        }
    }

    /// Writes the offset geometry of `engine`'s skeleton into `detail`.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::InvalidInput` if no skeleton has been
    /// computed, `distance` is negative or not finite, or `ndivs` is 0.
    pub fn execute(&self, engine: &StraightSkeleton, detail: &mut Detail) -> Result<OffsetResult> {
        let skeleton = engine
            .skeleton()
            .ok_or_else(|| OperationError::InvalidInput("no skeleton has been computed".into()))?;
        if !self.distance.is_finite() || self.distance < 0.0 {
            return Err(OperationError::InvalidInput(format!(
                "offset distance must be non-negative, got {}",
                self.distance
            ))
            .into());
        }
        if self.ndivs == 0 {
            return Err(OperationError::InvalidInput("ndivs must be at least 1".into()).into());
        }

        let tol = skeleton.distance_tol().max(TOLERANCE);
        let mut result = OffsetResult::default();
        let mut writer = OffsetWriter::new(detail, skeleton.plane(), self);
        for side in Side::BOTH {
            let wanted = match side {
                Side::Inside => self.inside,
                Side::Outside => self.outside,
            };
            if !wanted {
                continue;
            }
            let wavefront = skeleton.wavefront(side);
            let prims = match self.geo_type {
                OffsetGeoType::OffsetCurves => curves::build(&mut writer, wavefront, side, tol)?,
                OffsetGeoType::OffsetSurfaces => {
                    surfaces::build(&mut writer, wavefront, side, tol)?
                }
            };
            match side {
                Side::Inside => result.inside_prims = prims,
                Side::Outside => result.outside_prims = prims,
            }
        }

        if !self.keep_input {
            result.removed_input = self.remove_input(detail, skeleton.input_prims());
        }

        tracing::debug!(
            geo_type = ?self.geo_type,
            distance = self.distance,
            inside = result.inside_prims.len(),
            outside = result.outside_prims.len(),
            removed = result.removed_input,
            "offset geometry built"
        );
        Ok(result)
    }

    fn remove_input(&self, detail: &mut Detail, input: &[PrimId]) -> usize {
        let doomed: Vec<PrimId> = input
            .iter()
            .copied()
            .filter(|&p| {
                self.input_group
                    .as_deref()
                    .is_none_or(|group| detail.prim_in_group(group, p))
            })
            .collect();
        let mut points = Vec::new();
        let mut removed = 0;
        for prim in doomed {
            if let Ok(data) = detail.remove_prim(prim) {
                points.extend(data.points);
                removed += 1;
            }
        }
        detail.remove_orphan_points(&points);
        removed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::detail::{AttribOwner, PrimKind};
    use crate::math::{Point3, Vector3};
    use approx::assert_abs_diff_eq;

    fn unit_square() -> (Detail, PrimId, StraightSkeleton) {
        let mut detail = Detail::new();
        let prim = detail
            .add_polygon(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])
            .unwrap();
        let mut engine = StraightSkeleton::new();
        engine.compute_skeleton(&detail, None);
        (detail, prim, engine)
    }

    fn positions(detail: &Detail, prim: PrimId) -> Vec<Point3> {
        detail
            .prim(prim)
            .unwrap()
            .points
            .iter()
            .map(|&p| detail.point(p).unwrap().position)
            .collect()
    }

    #[test]
    fn inset_unit_square() {
        let (mut detail, _, engine) = unit_square();
        let result = BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 0.3)
            .with_inside_group("inset")
            .with_edge_dist_attrib("dist")
            .execute(&engine, &mut detail)
            .unwrap();

        assert_eq!(result.inside_prims.len(), 1);
        assert!(result.outside_prims.is_empty());
        let prim = result.inside_prims[0];
        assert_eq!(detail.prim(prim).unwrap().kind, PrimKind::Polygon);
        assert!(detail.prim_in_group("inset", prim));

        let corners = positions(&detail, prim);
        assert_eq!(corners.len(), 4);
        for (&id, p) in detail.prim(prim).unwrap().points.iter().zip(&corners) {
            assert_abs_diff_eq!((p.x - 0.5).abs(), 0.2, epsilon = 1e-9);
            assert_abs_diff_eq!((p.y - 0.5).abs(), 0.2, epsilon = 1e-9);
            assert_abs_diff_eq!(detail.point_attrib("dist", id).unwrap(), 0.3, epsilon = 1e-12);
            assert_eq!(detail.normal(id), Some(Vector3::z()));
        }
    }

    #[test]
    fn one_curve_per_division() {
        let (mut detail, _, engine) = unit_square();
        let result = BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 0.3)
            .with_ndivs(3)
            .with_edge_speed_attrib("speed")
            .execute(&engine, &mut detail)
            .unwrap();
        assert_eq!(result.inside_prims.len(), 3);
        for (k, &prim) in result.inside_prims.iter().enumerate() {
            let inset = 0.1 * (k + 1) as f64;
            let p = positions(&detail, prim)[0];
            assert_abs_diff_eq!((p.x - 0.5).abs(), 0.5 - inset, epsilon = 1e-9);
            assert_abs_diff_eq!(detail.vertex_attrib("speed", prim, 0).unwrap(), 1.0);
        }
    }

    #[test]
    fn outside_curves_grow() {
        let (mut detail, _, engine) = unit_square();
        let result = BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 0.5)
            .with_inside(false)
            .with_outside(true)
            .execute(&engine, &mut detail)
            .unwrap();
        assert!(result.inside_prims.is_empty());
        assert_eq!(result.outside_prims.len(), 1);
        for p in positions(&detail, result.outside_prims[0]) {
            assert_abs_diff_eq!((p.x - 0.5).abs(), 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!((p.y - 0.5).abs(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn ribbon_surfaces_share_points() {
        let (mut detail, _, engine) = unit_square();
        let before = detail.point_count();
        let result = BuildOffsetGeometry::new(OffsetGeoType::OffsetSurfaces, 0.3)
            .with_edge_speed_attrib("speed")
            .with_update_point_normals(false)
            .execute(&engine, &mut detail)
            .unwrap();
        assert_eq!(result.inside_prims.len(), 4);
        assert_eq!(detail.point_count() - before, 8);
        for &prim in &result.inside_prims {
            assert_eq!(detail.prim(prim).unwrap().vertex_count(), 4);
            assert_abs_diff_eq!(detail.prim_attrib("speed", prim).unwrap(), 1.0);
            for &p in &detail.prim(prim).unwrap().points {
                assert!(detail.normal(p).is_none());
            }
        }
        assert!(detail.has_attrib(AttribOwner::Primitive, "speed"));
    }

    #[test]
    fn removes_input_when_asked() {
        let (mut detail, input, engine) = unit_square();
        let result = BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 0.25)
            .with_keep_input(false)
            .execute(&engine, &mut detail)
            .unwrap();
        assert_eq!(result.removed_input, 1);
        assert!(detail.prim(input).is_err());
        assert_eq!(detail.prim_count(), 1);
        assert_eq!(detail.point_count(), 4);
    }

    #[test]
    fn removing_input_keeps_unrelated_points() {
        let (mut detail, _, engine) = unit_square();
        let loose = detail.add_point(Point3::new(10.0, 10.0, 0.0));
        BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 0.25)
            .with_keep_input(false)
            .execute(&engine, &mut detail)
            .unwrap();
        assert!(detail.point(loose).is_ok());
        assert_eq!(detail.point_count(), 5);
    }

    #[test]
    fn input_group_limits_removal() {
        let (mut detail, input, engine) = unit_square();
        detail.create_prim_group("other");
        let result = BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 0.25)
            .with_keep_input(false)
            .with_input_group("other")
            .execute(&engine, &mut detail)
            .unwrap();
        assert_eq!(result.removed_input, 0);
        assert!(detail.prim(input).is_ok());
    }

    #[test]
    fn rejects_bad_arguments() {
        let (mut detail, _, engine) = unit_square();
        assert!(BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, -1.0)
            .execute(&engine, &mut detail)
            .is_err());
        assert!(BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 1.0)
            .with_ndivs(0)
            .execute(&engine, &mut detail)
            .is_err());
        assert!(BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 1.0)
            .execute(&StraightSkeleton::new(), &mut detail)
            .is_err());
    }

    #[test]
    fn end_caps_can_be_omitted() {
        let mut detail = Detail::new();
        detail
            .add_polyline(&[Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)])
            .unwrap();
        let mut engine = StraightSkeleton::new();
        engine.compute_skeleton(&detail, None);

        let capped = BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 0.5)
            .with_inside(false)
            .with_outside(true)
            .execute(&engine, &mut detail)
            .unwrap();
        assert_eq!(capped.outside_prims.len(), 1);
        assert_eq!(detail.prim(capped.outside_prims[0]).unwrap().kind, PrimKind::Polygon);

        let split = BuildOffsetGeometry::new(OffsetGeoType::OffsetCurves, 0.5)
            .with_inside(false)
            .with_outside(true)
            .with_split_curves_to_omit_end_caps(true)
            .execute(&engine, &mut detail)
            .unwrap();
        assert_eq!(split.outside_prims.len(), 2);
        for &prim in &split.outside_prims {
            let data = detail.prim(prim).unwrap();
            assert_eq!(data.kind, PrimKind::Polyline);
            assert_eq!(data.vertex_count(), 2);
        }
    }
}
