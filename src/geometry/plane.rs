use crate::error::{GeometryError, Result};
use crate::math::{Point2, Point3, Vector3, TOLERANCE};

/// The working plane that input geometry is projected into.
///
/// Defined by a unit normal and a signed distance (`normal · p = distance`).
/// The in-plane basis (`u_dir`, `v_dir`) is orthonormal with
/// `u_dir × v_dir = normal`, so counter-clockwise loops viewed from the
/// normal's side stay counter-clockwise in plane coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionPlane {
    normal: Vector3,
    distance: f64,
    origin: Point3,
    u_dir: Vector3,
    v_dir: Vector3,
}

impl Default for ProjectionPlane {
    /// The XY plane through the origin.
    fn default() -> Self {
        Self {
            normal: Vector3::z(),
            distance: 0.0,
            origin: Point3::origin(),
            u_dir: Vector3::x(),
            v_dir: Vector3::y(),
        }
    }
}

impl ProjectionPlane {
    /// Creates a plane from a (not necessarily unit) normal and a distance
    /// along that normal.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::ZeroVector` if the normal is zero-length.
    pub fn new(normal: Vector3, distance: f64) -> Result<Self> {
        let len = normal.norm();
        if len < TOLERANCE || !len.is_finite() {
            return Err(GeometryError::ZeroVector.into());
        }
        let normal = normal / len;

        // Choose a reference vector not parallel to the normal
        let reference = if normal.x.abs() < 0.9 {
            Vector3::new(1.0, 0.0, 0.0)
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };
        let v_dir = normal.cross(&reference).normalize();
        let u_dir = v_dir.cross(&normal);

        Ok(Self {
            normal,
            distance,
            origin: Point3::from(normal * distance),
            u_dir,
            v_dir,
        })
    }

    /// Returns the unit normal.
    #[must_use]
    pub fn normal(&self) -> &Vector3 {
        &self.normal
    }

    /// Returns the signed distance of the plane from the origin.
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Returns the point of the plane closest to the world origin.
    #[must_use]
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    /// Returns the U direction vector.
    #[must_use]
    pub fn u_dir(&self) -> &Vector3 {
        &self.u_dir
    }

    /// Returns the V direction vector.
    #[must_use]
    pub fn v_dir(&self) -> &Vector3 {
        &self.v_dir
    }

    /// Projects a 3D point into plane coordinates.
    #[must_use]
    pub fn to_2d(&self, p: &Point3) -> Point2 {
        let d = p - self.origin;
        Point2::new(d.dot(&self.u_dir), d.dot(&self.v_dir))
    }

    /// Signed height of a 3D point above the plane.
    #[must_use]
    pub fn height(&self, p: &Point3) -> f64 {
        (p - self.origin).dot(&self.normal)
    }

    /// Lifts plane coordinates back into 3D.
    #[must_use]
    pub fn to_3d(&self, p: &Point2) -> Point3 {
        self.origin + self.u_dir * p.x + self.v_dir * p.y
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rejects_zero_normal() {
        assert!(ProjectionPlane::new(Vector3::zeros(), 1.0).is_err());
    }

    #[test]
    fn xy_plane_is_identity() {
        let plane = ProjectionPlane::new(Vector3::new(0.0, 0.0, 2.0), 0.0).unwrap();
        let p = plane.to_2d(&Point3::new(3.0, -4.0, 0.0));
        assert_abs_diff_eq!(p.x, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, -4.0, epsilon = 1e-12);
    }

    #[test]
    fn basis_is_right_handed() {
        let plane = ProjectionPlane::new(Vector3::new(1.0, 2.0, -0.5), 3.0).unwrap();
        let n = plane.u_dir().cross(plane.v_dir());
        assert_abs_diff_eq!((n - plane.normal()).norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(plane.u_dir().dot(plane.v_dir()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn round_trip_on_plane() {
        let plane = ProjectionPlane::new(Vector3::new(1.0, 1.0, 1.0), 2.0).unwrap();
        for &(x, y) in &[(0.0, 0.0), (1.5, -2.0), (-7.25, 3.5)] {
            let p3 = plane.to_3d(&Point2::new(x, y));
            assert_abs_diff_eq!(plane.height(&p3), 0.0, epsilon = 1e-12);
            let back = plane.to_3d(&plane.to_2d(&p3));
            assert_abs_diff_eq!((back - p3).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn off_plane_points_project_orthogonally() {
        let plane = ProjectionPlane::new(Vector3::z(), 1.0).unwrap();
        let p = Point3::new(2.0, 3.0, 5.0);
        assert_abs_diff_eq!(plane.height(&p), 4.0, epsilon = 1e-12);
        let back = plane.to_3d(&plane.to_2d(&p));
        assert_abs_diff_eq!((back - Point3::new(2.0, 3.0, 1.0)).norm(), 0.0, epsilon = 1e-12);
    }
}
