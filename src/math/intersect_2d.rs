use super::{cross_2d, Vector2};

/// Solves `n1 · x = c1`, `n2 · x = c2` for `x`.
///
/// Returns `None` when `|n1 × n2|` is not above `parallel_tol`.
#[must_use]
pub fn solve_line_pair(
    n1: &Vector2,
    c1: f64,
    n2: &Vector2,
    c2: f64,
    parallel_tol: f64,
) -> Option<Vector2> {
    let det = cross_2d(n1, n2);
    if det.abs() <= parallel_tol {
        return None;
    }
    Some(Vector2::new(
        (c1 * n2.y - c2 * n1.y) / det,
        (n1.x * c2 - n2.x * c1) / det,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn line_pair_solution() {
        // x = 1, y = 2
        let x = solve_line_pair(&Vector2::new(1.0, 0.0), 1.0, &Vector2::new(0.0, 1.0), 2.0, 1e-9)
            .unwrap();
        assert_abs_diff_eq!(x.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x.y, 2.0, epsilon = 1e-12);
        // x + y = 3, x - y = 1
        let s = 0.5_f64.sqrt();
        let x = solve_line_pair(&Vector2::new(s, s), 3.0 * s, &Vector2::new(s, -s), s, 1e-9)
            .unwrap();
        assert_abs_diff_eq!(x.x, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x.y, 1.0, epsilon = 1e-12);
    }
}
