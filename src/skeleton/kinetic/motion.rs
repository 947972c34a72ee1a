use crate::math::intersect_2d::solve_line_pair;
use crate::math::{cross_2d, Vector2};

use super::WavefrontEdge;

/// How a wavefront vertex moves between its two incident edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub velocity: Vector2,
    /// The incident edges are antiparallel; the vertex is pinned in place and
    /// collapses with its neighbour as soon as it is processed.
    pub infinite: bool,
}

/// Velocity keeping a vertex on the supporting lines of `incoming` and
/// `outgoing` (`n · p = c + w t`).
///
/// Nearly parallel edges facing the same way move the vertex along their
/// common normal at the faster of the two speeds.
#[must_use]
pub fn vertex_motion(
    incoming: &WavefrontEdge,
    outgoing: &WavefrontEdge,
    parallel_tol: f64,
) -> Motion {
    let (n1, n2) = (incoming.normal, outgoing.normal);
    let solved = solve_line_pair(&n1, incoming.weight, &n2, outgoing.weight, parallel_tol);
    if let Some(velocity) = solved {
        return Motion {
            velocity,
            infinite: false,
        };
    }

    if n1.dot(&n2) > 0.0 {
        let sum = n1 + n2;
        let dir = if sum.norm() > 0.0 { sum.normalize() } else { n1 };
        let speed = if incoming.weight.abs() >= outgoing.weight.abs() {
            incoming.weight
        } else {
            outgoing.weight
        };
        Motion {
            velocity: dir * speed,
            infinite: false,
        }
    } else {
        Motion {
            velocity: Vector2::zeros(),
            infinite: true,
        }
    }
}

/// Returns `true` if the turn from `incoming` to `outgoing` is reflex with
/// respect to the region on their left.
#[must_use]
pub fn is_reflex(incoming: &WavefrontEdge, outgoing: &WavefrontEdge) -> bool {
    cross_2d(&incoming.normal, &outgoing.normal) < 0.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point2;
    use crate::skeleton::result::EdgeKind;
    use approx::assert_abs_diff_eq;

    fn edge(dir: Vector2, weight: f64) -> WavefrontEdge {
        WavefrontEdge::new(Point2::origin(), Point2::from(dir), weight, EdgeKind::Input).unwrap()
    }

    #[test]
    fn convex_corner_moves_along_bisector() {
        // Bottom edge going +x, then right edge going +y: square corner (1, 0).
        let m = vertex_motion(
            &edge(Vector2::new(1.0, 0.0), 1.0),
            &edge(Vector2::new(0.0, 1.0), 1.0),
            1e-9,
        );
        assert!(!m.infinite);
        assert_abs_diff_eq!(m.velocity.x, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.velocity.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn weights_skew_the_bisector() {
        let m = vertex_motion(
            &edge(Vector2::new(1.0, 0.0), 2.0),
            &edge(Vector2::new(0.0, 1.0), 1.0),
            1e-9,
        );
        assert_abs_diff_eq!(m.velocity.x, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.velocity.y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn parallel_edges_use_fastest_speed() {
        let m = vertex_motion(
            &edge(Vector2::new(1.0, 0.0), 1.0),
            &edge(Vector2::new(1.0, 0.0), 3.0),
            1e-9,
        );
        assert!(!m.infinite);
        assert_abs_diff_eq!(m.velocity.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.velocity.y, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn antiparallel_edges_pin_the_vertex() {
        let m = vertex_motion(
            &edge(Vector2::new(1.0, 0.0), 1.0),
            &edge(Vector2::new(-1.0, 0.0), 1.0),
            1e-9,
        );
        assert!(m.infinite);
        assert_abs_diff_eq!(m.velocity.norm(), 0.0);
    }

    #[test]
    fn reflex_turns() {
        let a = edge(Vector2::new(1.0, 0.0), 1.0);
        assert!(!is_reflex(&a, &edge(Vector2::new(0.0, 1.0), 1.0)));
        assert!(is_reflex(&a, &edge(Vector2::new(0.0, -1.0), 1.0)));
    }
}
