use super::{Matrix3, Point3, Vector3, TOLERANCE};

/// Least-squares plane through a point set.
///
/// Returns `(unit normal, distance)` with `normal · p = distance` for points on
/// the plane, or `None` when fewer than three points are given or the points
/// are collinear. The normal is oriented towards +Z (then +Y, then +X) so that
/// repeated fits of the same data agree.
#[must_use]
pub fn fit_plane(points: &[Point3]) -> Option<(Vector3, f64)> {
    if points.len() < 3 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let inv_n = 1.0 / points.len() as f64;
    let mean = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        * inv_n;

    let mut cov = Matrix3::zeros();
    for p in points {
        let d = p.coords - mean;
        cov += d * d.transpose();
    }
    cov *= inv_n;

    let eigen = nalgebra::SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let largest = eigen.eigenvalues[order[2]];
    let middle = eigen.eigenvalues[order[1]];
    // Collinear (or coincident) points have a single dominant direction.
    if largest < TOLERANCE || middle <= largest * 1e-12 {
        return None;
    }

    let column = eigen.eigenvectors.column(order[0]);
    let mut normal = Vector3::new(column[0], column[1], column[2]);
    let len = normal.norm();
    if len < TOLERANCE {
        return None;
    }
    normal /= len;
    if orientation_key(&normal) < 0.0 {
        normal = -normal;
    }

    Some((normal, normal.dot(&mean)))
}

fn orientation_key(n: &Vector3) -> f64 {
    if n.z.abs() > TOLERANCE {
        n.z
    } else if n.y.abs() > TOLERANCE {
        n.y
    } else {
        n.x
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn fits_xy_plane() {
        let pts = vec![
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(1.0, 1.0, 2.0),
            Point3::new(0.0, 1.0, 2.0),
        ];
        let (n, d) = fit_plane(&pts).unwrap();
        assert_abs_diff_eq!(n.z, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(d, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn fits_tilted_plane() {
        // Plane x + z = 1.
        let pts = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 1.0),
            Point3::new(0.5, -2.0, 0.5),
        ];
        let (n, d) = fit_plane(&pts).unwrap();
        let s = 0.5_f64.sqrt();
        assert_abs_diff_eq!(n.x, s, epsilon = 1e-9);
        assert_abs_diff_eq!(n.z, s, epsilon = 1e-9);
        assert_abs_diff_eq!(d, s, epsilon = 1e-9);
    }

    #[test]
    fn rejects_too_few_points() {
        assert!(fit_plane(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)]).is_none());
    }

    #[test]
    fn rejects_collinear_points() {
        let pts: Vec<_> = (0..5)
            .map(|i| Point3::new(f64::from(i), 2.0 * f64::from(i), 0.0))
            .collect();
        assert!(fit_plane(&pts).is_none());
    }
}
