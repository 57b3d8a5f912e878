//! Splitting strategy: turn one box into two or three children along one coordinate.
//!
//! Along the chosen coordinate `i` the box `[a, c]` holds its representative at `x0`.
//! One trial point is placed at the midpoint of the longer side of `x0`, and a second
//! at the midpoint of the shorter side when that side is wide enough and budget
//! remains. Between each pair of neighbouring points a boundary is placed by the
//! golden-section rule, so the child of the better point gets the larger share of the
//! gap. With three points, the boundary next to the minimiser of the interpolating
//! quadratic is then moved so the minimiser falls in the better point's child.
//!
//! ```text
//!   a        p0        |b0|        p1     |b1|     p2        c
//!   [--------*----------|----------*-------|-------*---------]
//! ```

use crate::mcs::Evaluator;
use crate::storage::{rank_value, BoxState, McsBox, PartitionStore};
use crate::types::Objective;

/// Golden-section ratio `(sqrt(5) - 1) / 2`.
pub const GOLDEN: f64 = 0.618_033_988_749_894_9;

/// Sides at or below this width (unit-cube) are not split.
pub const MIN_WIDTH: f64 = 1e-12;

/// What happened to a box handed to [`split_box`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitOutcome {
    /// The box was retired and replaced by `children` boxes.
    Split { dim: usize, children: usize },
    /// No coordinate is wide enough; the box was marked terminal.
    Terminal,
    /// No evaluation is left; the box is unchanged.
    NoBudget,
}

/// Coordinate to split `b` along: round-robin from `split_count`, skipping sides that
/// have collapsed.
pub fn split_coordinate(b: &McsBox) -> Option<usize> {
    let n = b.lo.len();
    (0..n)
        .map(|k| (b.split_count + k) % n)
        .find(|&i| b.width(i) > MIN_WIDTH)
}

/// Boundary between neighbouring points `p < q` with values `fp`, `fq`.
///
/// The better point's child gets the golden share of the gap; equal values split it
/// in half.
pub fn golden_boundary(p: f64, fp: f64, q: f64, fq: f64) -> f64 {
    let (fp, fq) = (rank_value(fp), rank_value(fq));
    let t = if fp < fq {
        GOLDEN
    } else if fq < fp {
        1.0 - GOLDEN
    } else {
        0.5
    };
    p + t * (q - p)
}

/// Minimiser of the quadratic through three points with `p0 < p1 < p2`.
///
/// Returns `None` when the quadratic is not convex or any value is non-finite.
pub fn quadratic_minimizer(p: [f64; 3], g: [f64; 3]) -> Option<f64> {
    if g.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let d1 = (g[1] - g[0]) / (p[1] - p[0]);
    let d2 = (g[2] - g[1]) / (p[2] - p[1]);
    let a = (d2 - d1) / (p[2] - p[0]);
    if a.is_nan() || a <= 0.0 {
        return None;
    }
    let xm = 0.5 * (p[0] + p[1]) - d1 / (2.0 * a);
    xm.is_finite().then_some(xm)
}

/// Boundaries between sorted points `p` with values `g`.
///
/// One boundary per neighbouring pair, each strictly between its two points.
pub fn boundaries(p: &[f64], g: &[f64]) -> Vec<f64> {
    let mut b: Vec<f64> = (0..p.len() - 1)
        .map(|k| golden_boundary(p[k], g[k], p[k + 1], g[k + 1]))
        .collect();

    if p.len() == 3 {
        if let Some(xm) = quadratic_minimizer([p[0], p[1], p[2]], [g[0], g[1], g[2]]) {
            if let Some(k) = (0..2).find(|&k| p[k] < xm && xm < p[k + 1]) {
                // Put the boundary halfway between xm and the worse point of the pair.
                let other = if rank_value(g[k]) <= rank_value(g[k + 1]) {
                    p[k + 1]
                } else {
                    p[k]
                };
                let mid = 0.5 * (xm + other);
                if p[k] < mid && mid < p[k + 1] {
                    b[k] = mid;
                }
            }
        }
    }
    b
}

/// Split box `id`, evaluating one or two trial points through `ev`.
///
/// The children are inserted at `level + 1` (terminal if that is `smax`) and tile the
/// parent exactly. A split is never left half-done: if only one evaluation is left,
/// the box is split into two children instead of three.
pub fn split_box<F: Objective>(
    store: &mut PartitionStore,
    id: usize,
    ev: &mut Evaluator<F>,
) -> SplitOutcome {
    if ev.exhausted() {
        return SplitOutcome::NoBudget;
    }
    let parent = store.get(id).clone();
    debug_assert_eq!(parent.state, BoxState::Splittable);

    let Some(i) = split_coordinate(&parent) else {
        store.mark_terminal(id);
        return SplitOutcome::Terminal;
    };

    let (a, c, x0) = (parent.lo[i], parent.hi[i], parent.x[i]);
    let (left, right) = (x0 - a, c - x0);
    let (z1, z2) = if right >= left {
        (0.5 * (x0 + c), 0.5 * (a + x0))
    } else {
        (0.5 * (a + x0), 0.5 * (x0 + c))
    };

    let mut trial = parent.x.clone();
    trial[i] = z1;
    let Some(f1) = ev.evaluate(&trial) else {
        return SplitOutcome::NoBudget;
    };
    let mut points = vec![(x0, parent.f), (z1, f1)];

    if left.min(right) > MIN_WIDTH {
        trial[i] = z2;
        if let Some(f2) = ev.evaluate(&trial) {
            points.push((z2, f2));
        }
    }
    points.sort_by(|l, r| l.0.total_cmp(&r.0));

    let p: Vec<f64> = points.iter().map(|q| q.0).collect();
    let g: Vec<f64> = points.iter().map(|q| q.1).collect();
    let mut edges = Vec::with_capacity(p.len() + 1);
    edges.push(a);
    edges.extend(boundaries(&p, &g));
    edges.push(c);

    store.retire(id, i);
    for (k, &(pk, fk)) in points.iter().enumerate() {
        let mut lo = parent.lo.clone();
        let mut hi = parent.hi.clone();
        lo[i] = edges[k];
        hi[i] = edges[k + 1];
        let mut x = parent.x.clone();
        x[i] = pk;
        let child = McsBox::new(
            Some(id),
            parent.level + 1,
            lo,
            hi,
            x,
            fk,
            parent.split_count + 1,
        );
        store.insert(child);
    }
    ev.counters.splits += 1;

    crate::trace_write!(
        ev.tracer,
        "TRACE SPLIT box={} level={} dim={} children={} edges={:?}",
        id,
        parent.level,
        i,
        points.len(),
        edges
    );

    SplitOutcome::Split {
        dim: i,
        children: points.len(),
    }
}
