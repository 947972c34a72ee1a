//! Weighted straight skeletons of planar polygon graphs.
//!
//! [`StraightSkeleton`] projects the primitives of a [`Detail`] into a
//! working plane, labels the plane inside/outside, and propagates a
//! wavefront from the input edges into each side with a kinetic
//! triangulation. The result is kept as a [`Skeleton`] until the next
//! computation and can be turned into offset geometry with
//! [`BuildOffsetGeometry`](crate::operations::offset::BuildOffsetGeometry).

pub mod classify;
pub mod graph;
pub mod kinetic;
pub mod result;
pub mod seed;
pub mod weights;

pub use classify::{InOutType, Side};
pub use result::{
    ArcEnd, EdgeKind, EventKind, Skeleton, SkeletonArc, SkeletonEvent, SkeletonNode, Wavefront,
    WavefrontLoop,
};

use crate::detail::Detail;
use crate::diagnostics::{ErrorLog, Severity};
use crate::error::Result;
use crate::geometry::ProjectionPlane;
use crate::math::{fit, Point2, Point3, Vector3, TOLERANCE};

use classify::Classification;
use graph::PolygonGraph;
use kinetic::Simulation;
use result::SkeletonRecord;
use weights::WeightLookup;

/// Base number of events a side may process before propagation is aborted.
const EVENT_BUDGET: usize = 10_000;

/// Additional events allowed per seed triangle.
const EVENTS_PER_TRIANGLE: usize = 200;

/// Parameters for skeleton computation.
#[derive(Debug, Clone)]
pub struct SkeletonParams {
    /// Points closer than this are treated as coincident.
    pub distance_tol: f64,
    /// Edges whose directions differ by less than this are parallel.
    pub parallelism_tol: f64,
    /// How inside and outside are told apart.
    pub in_out: InOutType,
    /// Attribute holding wavefront speeds on the inside of each edge.
    pub inside_weight_attrib: Option<String>,
    /// Attribute holding wavefront speeds on the outside of each edge.
    pub outside_weight_attrib: Option<String>,
}

impl Default for SkeletonParams {
    fn default() -> Self {
        Self {
            distance_tol: 1e-5,
            parallelism_tol: 1e-5,
            in_out: InOutType::default(),
            inside_weight_attrib: None,
            outside_weight_attrib: None,
        }
    }
}

/// Computes and owns the straight skeleton of a set of primitives.
///
/// Problems found during [`compute_skeleton`](Self::compute_skeleton) are
/// not returned; check [`error_severity`](Self::error_severity) afterwards.
/// A skeleton computed with errors may be partial but is kept.
#[derive(Debug, Clone, Default)]
pub struct StraightSkeleton {
    plane: ProjectionPlane,
    params: SkeletonParams,
    skeleton: Option<Skeleton>,
    errors: ErrorLog,
}

impl StraightSkeleton {
    /// Creates an engine working in the XY plane with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all parameters.
    #[must_use]
    pub fn with_params(mut self, params: SkeletonParams) -> Self {
        self.params = params;
        self.clamp_tolerances();
        self
    }

    /// Sets the working plane `normal · p = distance`.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::ZeroVector` for a zero normal; the previous
    /// plane is kept.
    pub fn set_plane(&mut self, normal: Vector3, distance: f64) -> Result<()> {
        self.plane = ProjectionPlane::new(normal, distance)?;
        Ok(())
    }

    /// Fits the working plane to the points of `group` (or all points).
    ///
    /// Returns the fitted `(normal, distance)`, or `None` if the points do
    /// not span a plane or the group is unknown; the plane is then unchanged.
    pub fn fit_plane(&mut self, detail: &Detail, group: Option<&str>) -> Option<(Vector3, f64)> {
        let ids = detail.points_in(group).ok()?;
        let positions: Vec<Point3> = ids
            .iter()
            .filter_map(|&id| detail.point(id).ok().map(|p| p.position))
            .collect();
        let (normal, distance) = fit::fit_plane(&positions)?;
        self.plane = ProjectionPlane::new(normal, distance).ok()?;
        Some((normal, distance))
    }

    /// The current working plane.
    #[must_use]
    pub fn plane(&self) -> &ProjectionPlane {
        &self.plane
    }

    /// Projects `p` into working plane coordinates.
    #[must_use]
    pub fn make_2d(&self, p: &Point3) -> Point2 {
        self.plane.to_2d(p)
    }

    /// Lifts working plane coordinates back to 3D.
    #[must_use]
    pub fn make_3d(&self, p: &Point2) -> Point3 {
        self.plane.to_3d(p)
    }

    /// The current parameters.
    #[must_use]
    pub fn params(&self) -> &SkeletonParams {
        &self.params
    }

    /// Sets the coincidence tolerance. Negative values are clamped to 0.
    pub fn set_distance_tol(&mut self, tol: f64) {
        self.params.distance_tol = tol;
        self.clamp_tolerances();
    }

    /// Sets the parallelism tolerance. Negative values are clamped to 0.
    pub fn set_parallelism_tol(&mut self, tol: f64) {
        self.params.parallelism_tol = tol;
        self.clamp_tolerances();
    }

    /// Sets the inside/outside classification policy.
    pub fn set_in_out_type(&mut self, in_out: InOutType) {
        self.params.in_out = in_out;
    }

    /// Names the attribute holding inside speeds, or `None` for unit speeds.
    pub fn set_inside_weight_attrib(&mut self, name: Option<&str>) {
        self.params.inside_weight_attrib = name.map(str::to_owned);
    }

    /// Names the attribute holding outside speeds, or `None` for unit speeds.
    pub fn set_outside_weight_attrib(&mut self, name: Option<&str>) {
        self.params.outside_weight_attrib = name.map(str::to_owned);
    }

    fn clamp_tolerances(&mut self) {
        let clamp = |t: f64| if t.is_nan() { 0.0 } else { t.max(0.0) };
        self.params.distance_tol = clamp(self.params.distance_tol);
        self.params.parallelism_tol = clamp(self.params.parallelism_tol);
    }

    /// Computes the skeleton of the primitives in `group` (or all primitives),
    /// replacing any previous skeleton.
    ///
    /// Both sides of the input are propagated. Failures are recorded in the
    /// error log instead of being returned.
    pub fn compute_skeleton(&mut self, detail: &Detail, group: Option<&str>) {
        self.errors.clear();
        self.skeleton = None;
        let mut log = ErrorLog::new();
        match self.build(detail, group, &mut log) {
            Ok(skeleton) => self.skeleton = Some(skeleton),
            Err(err) => log.error(format!("skeleton construction failed: {err}")),
        }
        self.errors = log;
    }

    fn build(&self, detail: &Detail, group: Option<&str>, log: &mut ErrorLog) -> Result<Skeleton> {
        let params = &self.params;
        let tol = params.distance_tol.max(TOLERANCE);
        let inside_lookup = WeightLookup::new(detail, params.inside_weight_attrib.as_deref());
        let outside_lookup = WeightLookup::new(detail, params.outside_weight_attrib.as_deref());
        let graph = PolygonGraph::build(
            detail,
            group,
            &self.plane,
            params.distance_tol,
            &inside_lookup,
            &outside_lookup,
        )?;

        let mut skeleton = Skeleton {
            plane: self.plane.clone(),
            distance_tol: params.distance_tol,
            parallelism_tol: params.parallelism_tol,
            in_out: params.in_out,
            record: SkeletonRecord::default(),
            inside: Wavefront::default(),
            outside: Wavefront::default(),
            input_prims: detail.prims_in(group)?,
        };
        if graph.is_empty() {
            log.warning("no input edges to build a skeleton from");
            return Ok(skeleton);
        }

        let classification = Classification::build(&graph, params.in_out, log)?;
        skeleton.in_out = classification.in_out();

        for side in Side::BOTH {
            let segments = classification.emitting(side, &graph);
            if segments.is_empty() {
                continue;
            }
            let mesh =
                seed::seed_mesh(&classification, &segments, side, params.parallelism_tol, log)?;
            let budget = EVENT_BUDGET + EVENTS_PER_TRIANGLE * mesh.triangles.len();
            let wavefront = Simulation::new(
                mesh,
                side,
                tol,
                params.parallelism_tol,
                &mut skeleton.record,
                log,
            )
            .run(budget);
            match side {
                Side::Inside => skeleton.inside = wavefront,
                Side::Outside => skeleton.outside = wavefront,
            }
        }

        tracing::debug!(
            nodes = skeleton.record.nodes.len(),
            arcs = skeleton.record.arcs.len(),
            events = skeleton.record.events.len(),
            in_out = ?skeleton.in_out,
            "straight skeleton computed"
        );
        Ok(skeleton)
    }

    /// The skeleton from the last [`compute_skeleton`](Self::compute_skeleton).
    #[must_use]
    pub fn skeleton(&self) -> Option<&Skeleton> {
        self.skeleton.as_ref()
    }

    /// Worst severity logged by the last computation.
    #[must_use]
    pub fn error_severity(&self) -> Severity {
        self.errors.severity()
    }

    /// Everything logged by the last computation.
    #[must_use]
    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }
}
