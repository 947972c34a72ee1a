use crate::detail::{PrimId, PrimKind};
use crate::error::Result;
use crate::math::Point2;
use crate::skeleton::{Side, Wavefront, WavefrontLoop};

use super::writer::OffsetWriter;

/// Emits the wavefront loops of `side` at every sample time after 0.
pub(super) fn build(
    writer: &mut OffsetWriter<'_>,
    wavefront: &Wavefront,
    side: Side,
    tol: f64,
) -> Result<Vec<PrimId>> {
    let times = writer.op().sample_times();
    let split = writer.op().split_caps();
    let mut prims = Vec::new();
    for &time in times.iter().skip(1) {
        for chain in wavefront.loops_at(time, split) {
            let Some((points, speeds)) = clean_chain(&chain, tol) else {
                continue;
            };
            let ids = points.iter().map(|p| writer.add_point(p, time)).collect();
            let kind = if chain.closed {
                PrimKind::Polygon
            } else {
                PrimKind::Polyline
            };
            let prim = writer.add_prim(kind, ids, side)?;
            writer.set_vertex_speeds(prim, &speeds)?;
            prims.push(prim);
        }
    }
    Ok(prims)
}

/// Drops coincident consecutive points and pairs every remaining point with
/// the speed of the edge leaving it (the last edge's, at the end of an open
/// chain). Returns `None` if too few points remain.
fn clean_chain(chain: &WavefrontLoop, tol: f64) -> Option<(Vec<Point2>, Vec<f64>)> {
    let mut points: Vec<Point2> = Vec::with_capacity(chain.points.len());
    let mut speeds: Vec<f64> = Vec::with_capacity(chain.points.len());
    for (i, p) in chain.points.iter().enumerate() {
        let speed = chain
            .weights
            .get(i)
            .or_else(|| chain.weights.last())
            .copied()
            .unwrap_or(1.0);
        match points.last() {
            Some(last) if (p - last).norm() <= tol => {
                if let Some(s) = speeds.last_mut() {
                    *s = speed;
                }
            }
            _ => {
                points.push(*p);
                speeds.push(speed);
            }
        }
    }
    if chain.closed {
        while points.len() > 1 && (points[points.len() - 1] - points[0]).norm() <= tol {
            points.pop();
            speeds.pop();
        }
    }
    let min = if chain.closed { 3 } else { 2 };
    (points.len() >= min).then_some((points, speeds))
}
