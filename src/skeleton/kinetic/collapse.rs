use crate::math::{cross_2d, Point2, Vector2};

/// Snapshot of a kinetic triangle at the current simulation time.
#[derive(Debug, Clone, Copy)]
pub struct TriangleMotion {
    pub positions: [Point2; 3],
    pub velocities: [Vector2; 3],
    /// Vertices created at the current time.
    pub fresh: [bool; 3],
    /// Number of sides that are wavefront edges.
    pub wavefront_sides: usize,
}

impl TriangleMotion {
    /// Coefficients `(a, b, c)` of twice the signed area `a + b τ + c τ²`,
    /// where `τ` is the time from now.
    #[must_use]
    pub fn area_polynomial(&self) -> (f64, f64, f64) {
        let [p0, p1, p2] = self.positions;
        let [v0, v1, v2] = self.velocities;
        let (ea, eb) = (p1 - p0, p2 - p0);
        let (va, vb) = (v1 - v0, v2 - v0);
        (
            cross_2d(&ea, &eb),
            cross_2d(&ea, &vb) + cross_2d(&va, &eb),
            cross_2d(&va, &vb),
        )
    }

    /// Length of side `i` (opposite vertex `i`).
    #[must_use]
    pub fn side_length(&self, i: usize) -> f64 {
        (self.positions[(i + 2) % 3] - self.positions[(i + 1) % 3]).norm()
    }

    fn longest_side(&self) -> f64 {
        (0..3).map(|i| self.side_length(i)).fold(0.0, f64::max)
    }

    /// Time from now until the triangle collapses, or `None` if it never does.
    ///
    /// A triangle that is already degenerate collapses immediately when it
    /// is bounded by wavefront edges only, is still shrinking, or has a
    /// zero-length side between vertices that were not both just created.
    #[must_use]
    pub fn collapse_time(&self, tol: f64) -> Option<f64> {
        let (a, b, c) = self.area_polynomial();
        let scale = self.longest_side().max(tol);
        let eps = tol * scale;

        if a <= eps {
            let zero_side = (0..3).any(|i| {
                self.side_length(i) <= tol
                    && !(self.fresh[(i + 1) % 3] && self.fresh[(i + 2) % 3])
            });
            if self.wavefront_sides == 3 || b < -eps || (b.abs() <= eps && c < 0.0) || zero_side {
                return Some(0.0);
            }
            // Growing now; it may still turn around later.
            if c.abs() > f64::EPSILON {
                let root = -b / c;
                if root > tol {
                    return Some(root);
                }
            }
            return None;
        }

        if c.abs() <= f64::EPSILON * scale * scale {
            return (b < 0.0).then(|| -a / b);
        }

        let mut disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            // Tangent roots come out slightly negative.
            if disc > -1e-9 * (b * b + (4.0 * a * c).abs()) {
                disc = 0.0;
            } else {
                return None;
            }
        }
        let sq = disc.sqrt();
        let q = -0.5 * (b + b.signum() * sq);
        let mut roots = [q / c, if q == 0.0 { f64::INFINITY } else { a / q }];
        roots.sort_by(f64::total_cmp);
        roots.into_iter().find(|&r| r >= 0.0 && r.is_finite())
    }
}
