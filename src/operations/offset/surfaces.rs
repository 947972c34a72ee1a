use std::collections::HashMap;

use crate::detail::{PointId, PrimId, PrimKind};
use crate::error::Result;
use crate::math::Point2;
use crate::skeleton::{EdgeKind, Side, Wavefront};

use super::writer::OffsetWriter;

/// Emits, for every pair of consecutive sample times, the area each
/// wavefront edge sweeps between them.
///
/// A sweep is a quad from the edge at the earlier time to the edge at the
/// later time, or a triangle where one end has shrunk to a point. Points
/// are shared between sweeps that meet at the same vertex and time.
pub(super) fn build(
    writer: &mut OffsetWriter<'_>,
    wavefront: &Wavefront,
    side: Side,
    tol: f64,
) -> Result<Vec<PrimId>> {
    let times = writer.op().sample_times();
    let mut shared: HashMap<(usize, u64), PointId> = HashMap::new();
    let mut prims = Vec::new();

    for row in times.windows(2) {
        for span in &wavefront.spans {
            if span.kind == EdgeKind::Frame {
                continue;
            }
            let Some((from, to)) = span.overlap(row[0], row[1]) else {
                continue;
            };
            let corners = [
                (span.start, from),
                (span.end, from),
                (span.end, to),
                (span.start, to),
            ];
            let mut ring: Vec<(usize, f64, Point2)> = Vec::with_capacity(4);
            for (track, time) in corners {
                let p = wavefront.tracks[track].position_at(time);
                if ring.last().is_some_and(|&(_, _, q)| (p - q).norm() <= tol) {
                    continue;
                }
                ring.push((track, time, p));
            }
            while ring.len() > 1 && (ring[ring.len() - 1].2 - ring[0].2).norm() <= tol {
                ring.pop();
            }
            if ring.len() < 3 {
                continue;
            }

            let ids = ring
                .iter()
                .map(|&(track, time, p)| {
                    *shared
                        .entry((track, time.to_bits()))
                        .or_insert_with(|| writer.add_point(&p, time))
                })
                .collect();
            let prim = writer.add_prim(PrimKind::Polygon, ids, side)?;
            writer.set_prim_speed(prim, span.weight);
            prims.push(prim);
        }
    }
    Ok(prims)
}
