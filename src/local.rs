//! Local search refiner: trust-region polishing from a promising box.
//!
//! Works entirely in unit-cube coordinates on a private copy of the start point.
//! Each iteration either
//!
//! - fits a gradient by least squares to the evaluated points within a few trust
//!   radii, using the curvature prior `B` for the second-order term, and tries the
//!   model step `d = -B⁻¹g` cut back to the trust radius and the unit cube; or
//! - when too few nearby points are known, probes one coordinate at `±Δ`.
//!
//! A model step is accepted only if it gives a sufficient decrease,
//! `f(x) - f(x + d) >= gamma * pred`, where `pred = -(gᵀd + ½dᵀBd)`. Accepted steps
//! double `Δ` (up to a cap), rejected ones halve it.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::mcs::Evaluator;
use crate::types::{Objective, RunConfig};

/// Largest trust radius (unit-cube).
pub const MAX_RADIUS: f64 = 0.25;

/// Largest starting trust radius.
pub const START_RADIUS: f64 = 0.1;

/// Consecutive rejected model steps after which the search gives up.
pub const MAX_FAILURES: usize = 8;

/// Relative eigenvalue floor used to make the curvature prior positive definite.
const EIGEN_FLOOR: f64 = 1e-8;

/// Why a local search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStop {
    /// The trust radius or the model step fell below tolerance, or
    /// [`MAX_FAILURES`] model steps in a row were rejected.
    Converged,
    /// The per-search step cap or the run's evaluation budget ran out first.
    Truncated,
}

/// End point of a local search.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalOutcome {
    pub x: Vec<f64>,
    pub f: f64,
    pub stop: LocalStop,
}

impl LocalOutcome {
    #[inline]
    pub fn converged(&self) -> bool {
        self.stop == LocalStop::Converged
    }
}

/// Local search settings shared by every search of a run.
#[derive(Debug, Clone)]
pub struct LocalSearch {
    gamma: f64,
    max_steps: usize,
    tol: f64,
    /// Positive definite curvature prior in unit-cube coordinates.
    curvature: DMatrix<f64>,
}

impl LocalSearch {
    /// Build the refiner for a run.
    ///
    /// `hessian` is given in caller coordinates; with `x = lower + diag(width)·u` it
    /// becomes `diag(width)·H·diag(width)` in unit-cube coordinates. Without a prior
    /// the identity is used.
    pub fn new(cfg: &RunConfig, hessian: Option<&DMatrix<f64>>, width: &[f64]) -> Self {
        let n = width.len();
        let curvature = match hessian {
            Some(h) => {
                let s = DMatrix::from_diagonal(&DVector::from_column_slice(width));
                positive_definite(&s * h * &s)
            }
            None => DMatrix::identity(n, n),
        };
        Self {
            gamma: cfg.gamma,
            max_steps: cfg.local_max_steps,
            tol: cfg.local_tol,
            curvature,
        }
    }

    pub fn curvature(&self) -> &DMatrix<f64> {
        &self.curvature
    }

    /// Refine `(x0, f0)` and return the best point reached.
    ///
    /// `half_width` is the start box's largest half side, used for the initial trust
    /// radius. `cloud` holds already evaluated points available to the model. The
    /// search converges when `Δ < tol` or after [`MAX_FAILURES`] rejected model steps
    /// in a row. It is truncated after `max_steps` evaluations or when the run's
    /// budget runs out.
    pub fn run<F: Objective>(
        &self,
        ev: &mut Evaluator<F>,
        x0: &[f64],
        f0: f64,
        half_width: f64,
        cloud: &[(&[f64], f64)],
    ) -> LocalOutcome {
        let n = x0.len();
        let mut x = x0.to_vec();
        let mut fx = f0;
        let mut delta = half_width.clamp(10.0 * self.tol, START_RADIUS);

        // Points seen by this search, on top of the shared cloud.
        let mut own: Vec<(Vec<f64>, f64)> = vec![(x.clone(), fx)];
        let mut evals = 0usize;
        let mut failures = 0usize;
        let mut probe = Probe::default();

        let stop = loop {
            if delta < self.tol {
                break LocalStop::Converged;
            }
            if evals >= self.max_steps || ev.exhausted() {
                break LocalStop::Truncated;
            }
            let neighbours = nearest(&x, 3.0 * delta, 3 * n, cloud, &own);
            let step = match self.fit_gradient(&x, fx, &neighbours) {
                Some(g) => self.model_step(&x, &g, delta),
                None => None,
            };

            match step {
                Some((d, pred)) => {
                    if norm(&d) < self.tol {
                        break LocalStop::Converged;
                    }
                    let trial: Vec<f64> = x
                        .iter()
                        .zip(&d)
                        .map(|(a, b)| (a + b).clamp(0.0, 1.0))
                        .collect();
                    let Some(ft) = ev.evaluate(&trial) else {
                        break LocalStop::Truncated;
                    };
                    evals += 1;
                    own.push((trial.clone(), ft));
                    if ft.is_finite() && ft < fx && fx - ft >= self.gamma * pred {
                        x = trial;
                        fx = ft;
                        delta = (2.0 * delta).min(MAX_RADIUS);
                        failures = 0;
                    } else {
                        delta *= 0.5;
                        failures += 1;
                        if failures >= MAX_FAILURES {
                            break LocalStop::Converged;
                        }
                    }
                }
                None => {
                    let Some(trial) = probe.next_point(&x, delta) else {
                        delta *= 0.5;
                        probe = Probe::default();
                        continue;
                    };
                    let Some(ft) = ev.evaluate(&trial) else {
                        break LocalStop::Truncated;
                    };
                    evals += 1;
                    own.push((trial.clone(), ft));
                    if ft.is_finite() && ft < fx {
                        x = trial;
                        fx = ft;
                        probe.accepted();
                    } else if probe.rejected(n) {
                        delta *= 0.5;
                    }
                }
            }
        };
        LocalOutcome { x, f: fx, stop }
    }

    /// Least-squares gradient at `x` from neighbouring points.
    ///
    /// Solves `min ‖A g - r‖` with rows `dⱼ = pⱼ - x` and `rⱼ = fⱼ - f(x) - ½dⱼᵀBdⱼ`.
    /// Returns `None` if the system is rank deficient.
    fn fit_gradient(&self, x: &[f64], fx: f64, pts: &[(Vec<f64>, f64)]) -> Option<DVector<f64>> {
        let n = x.len();
        if pts.len() < n || !fx.is_finite() {
            return None;
        }
        let m = pts.len();
        let mut a = DMatrix::zeros(m, n);
        let mut r = DVector::zeros(m);
        for (row, (p, fp)) in pts.iter().enumerate() {
            let d = DVector::from_iterator(n, p.iter().zip(x).map(|(pi, xi)| pi - xi));
            let curv = 0.5 * d.dot(&(&self.curvature * &d));
            r[row] = fp - fx - curv;
            a.set_row(row, &d.transpose());
        }

        let svd = a.svd(true, true);
        let smax = svd.singular_values.max();
        if smax <= 0.0 {
            return None;
        }
        let eps = 1e-10 * smax;
        if svd.rank(eps) < n {
            return None;
        }
        let g = svd.solve(&r, eps).ok()?;
        g.iter().all(|v| v.is_finite()).then_some(g)
    }

    /// Model step inside the trust region and the unit cube, with its predicted
    /// decrease. `None` if no useful step stays feasible.
    fn model_step(&self, x: &[f64], g: &DVector<f64>, delta: f64) -> Option<(Vec<f64>, f64)> {
        let newton = match self.curvature.clone().cholesky() {
            Some(chol) => -chol.solve(g),
            None => -g.clone(),
        };
        let len = newton.norm();
        if !len.is_finite() {
            return None;
        }
        if len < self.tol {
            // Stationary under the model.
            return Some((vec![0.0; x.len()], 0.0));
        }
        let mut t = (delta / len).min(1.0);
        // Shorten along the direction until the step stays in [0, 1]^n.
        for (xi, di) in x.iter().zip(newton.iter()) {
            if *di > 0.0 {
                t = t.min((1.0 - xi) / di);
            } else if *di < 0.0 {
                t = t.min(-xi / di);
            }
        }
        if t <= 0.0 {
            return None;
        }
        let d = newton * t;
        let pred = -(g.dot(&d) + 0.5 * d.dot(&(&self.curvature * &d)));
        if pred.is_nan() || pred <= 0.0 {
            return None;
        }
        Some((d.iter().copied().collect(), pred))
    }
}

/// Coordinate probing state: dimension and sign of the next probe.
#[derive(Debug, Default)]
struct Probe {
    dim: usize,
    negative: bool,
    failures: usize,
    skipped: usize,
}

impl Probe {
    /// Next probe point `x ± Δ·e_dim` inside the unit cube, or `None` once every
    /// direction has been skipped.
    fn next_point(&mut self, x: &[f64], delta: f64) -> Option<Vec<f64>> {
        let n = x.len();
        while self.skipped < 2 * n {
            let s = if self.negative { -delta } else { delta };
            let v = x[self.dim] + s;
            if (0.0..=1.0).contains(&v) {
                self.skipped = 0;
                let mut p = x.to_vec();
                p[self.dim] = v;
                return Some(p);
            }
            self.advance(n);
            self.skipped += 1;
        }
        None
    }

    fn accepted(&mut self) {
        self.failures = 0;
    }

    /// Record a failed probe. Returns true after `2n` failures in a row.
    fn rejected(&mut self, n: usize) -> bool {
        self.advance(n);
        self.failures += 1;
        if self.failures >= 2 * n {
            self.failures = 0;
            true
        } else {
            false
        }
    }

    fn advance(&mut self, n: usize) {
        if self.negative {
            self.dim = (self.dim + 1) % n;
        }
        self.negative = !self.negative;
    }
}

/// Up to `k` points closest to `x` within `radius`, excluding `x` itself.
fn nearest(
    x: &[f64],
    radius: f64,
    k: usize,
    cloud: &[(&[f64], f64)],
    own: &[(Vec<f64>, f64)],
) -> Vec<(Vec<f64>, f64)> {
    let mut found: Vec<(f64, &[f64], f64)> = cloud
        .iter()
        .map(|&(p, f)| (p, f))
        .chain(own.iter().map(|(p, f)| (p.as_slice(), *f)))
        .filter(|(_, f)| f.is_finite())
        .filter_map(|(p, f)| {
            let dist = distance(x, p);
            (dist > 0.0 && dist <= radius).then_some((dist, p, f))
        })
        .collect();
    found.sort_by(|a, b| a.0.total_cmp(&b.0));
    found
        .into_iter()
        .take(k)
        .map(|(_, p, f)| (p.to_vec(), f))
        .collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Shift the spectrum of a symmetric matrix so every eigenvalue is at least
/// `EIGEN_FLOOR · max(|λ|max, 1)`.
pub fn positive_definite(h: DMatrix<f64>) -> DMatrix<f64> {
    let sym = (&h + h.transpose()) * 0.5;
    let eig = SymmetricEigen::new(sym.clone());
    let floor = EIGEN_FLOOR * eig.eigenvalues.amax().max(1.0);
    if eig.eigenvalues.iter().all(|&l| l >= floor) {
        return sym;
    }
    let clamped = DMatrix::from_diagonal(&eig.eigenvalues.map(|l| l.max(floor)));
    let q = &eig.eigenvectors;
    q * clamped * q.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::McsOptions;
    use crate::Mcs;
    use approx::assert_abs_diff_eq;

    fn config(n: usize) -> RunConfig {
        McsOptions::default().resolve(n).unwrap()
    }

    #[test]
    fn test_identity_prior_without_hessian() {
        let ls = LocalSearch::new(&config(3), None, &[1.0, 2.0, 3.0]);
        assert_eq!(ls.curvature(), &DMatrix::<f64>::identity(3, 3));
    }

    #[test]
    fn test_prior_is_rescaled() {
        let h = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 4.0]);
        let ls = LocalSearch::new(&config(2), Some(&h), &[10.0, 0.5]);
        let c = ls.curvature();
        assert_abs_diff_eq!(c[(0, 0)], 200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c[(0, 1)], 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c[(1, 0)], 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c[(1, 1)], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_indefinite_prior_is_shifted() {
        let h = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -3.0]);
        let pd = positive_definite(h);
        let eig = SymmetricEigen::new(pd.clone());
        assert!(eig.eigenvalues.iter().all(|&l| l > 0.0));
        assert!(pd.clone().cholesky().is_some());
        assert_abs_diff_eq!(pd[(0, 0)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_prior_is_shifted() {
        let pd = positive_definite(DMatrix::from_element(4, 4, 1.0));
        assert!(pd.cholesky().is_some());
    }

    #[test]
    fn test_fit_gradient_recovers_linear_slope() {
        let ls = LocalSearch::new(&config(2), Some(&DMatrix::zeros(2, 2)), &[1.0, 1.0]);
        // f = 3u0 - 2u1 + 1, the zero prior is floored to ~1e-8.
        let f = |p: &[f64]| 3.0 * p[0] - 2.0 * p[1] + 1.0;
        let x = [0.5, 0.5];
        let pts: Vec<(Vec<f64>, f64)> = [[0.6, 0.5], [0.5, 0.6], [0.4, 0.45]]
            .iter()
            .map(|p| (p.to_vec(), f(p)))
            .collect();
        let g = ls.fit_gradient(&x, f(&x), &pts).unwrap();
        assert_abs_diff_eq!(g[0], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(g[1], -2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fit_gradient_needs_n_independent_points() {
        let ls = LocalSearch::new(&config(2), None, &[1.0, 1.0]);
        let x = [0.5, 0.5];
        assert!(ls.fit_gradient(&x, 0.0, &[(vec![0.6, 0.5], 1.0)]).is_none());
        // Collinear points do not determine a 2-D gradient.
        let pts = vec![(vec![0.6, 0.5], 1.0), (vec![0.7, 0.5], 2.0)];
        assert!(ls.fit_gradient(&x, 0.0, &pts).is_none());
    }

    #[test]
    fn test_model_step_stays_in_cube_and_region() {
        let ls = LocalSearch::new(&config(2), None, &[1.0, 1.0]);
        let g = DVector::from_vec(vec![-10.0, 0.0]);
        let (d, pred) = ls.model_step(&[0.95, 0.5], &g, 0.2).unwrap();
        assert!(pred > 0.0);
        assert!(0.95 + d[0] <= 1.0 + 1e-15);
        assert!(norm(&d) <= 0.2 + 1e-15);
        // At the face with the step pointing out, nothing is feasible.
        assert!(ls.model_step(&[1.0, 0.5], &g, 0.2).is_none());
    }

    #[test]
    fn test_probe_cycles_directions() {
        let mut probe = Probe::default();
        let x = [0.5, 0.5];
        assert_eq!(probe.next_point(&x, 0.1).unwrap(), vec![0.6, 0.5]);
        assert!(!probe.rejected(2));
        assert_eq!(probe.next_point(&x, 0.1).unwrap(), vec![0.4, 0.5]);
        assert!(!probe.rejected(2));
        assert_eq!(probe.next_point(&x, 0.1).unwrap(), vec![0.5, 0.6]);
        assert!(!probe.rejected(2));
        assert!(probe.next_point(&x, 0.1).is_some());
        assert!(probe.rejected(2));
    }

    #[test]
    fn test_probe_skips_infeasible_directions() {
        let mut probe = Probe::default();
        let p = probe.next_point(&[1.0], 0.1).unwrap();
        assert_abs_diff_eq!(p[0], 0.9, epsilon = 1e-15);
        let mut probe = Probe::default();
        assert!(probe.next_point(&[0.5], 0.6).is_none());
    }

    fn ellipse(x: &[f64]) -> f64 {
        (x[0] - 0.31).powi(2) + 2.0 * (x[1] - 0.62).powi(2)
    }

    fn ellipse_run(nf: usize) -> Mcs<fn(&[f64]) -> f64> {
        let opts = McsOptions {
            max_feval: Some(nf),
            ..Default::default()
        };
        Mcs::new(ellipse as fn(&[f64]) -> f64, &vec![(0.0, 1.0); 2], opts).unwrap()
    }

    #[test]
    fn test_run_with_exact_prior_converges() {
        let mut run = ellipse_run(500);
        let cfg = run.config().clone();
        let h = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let ls = LocalSearch::new(&cfg, Some(&h), &[1.0, 1.0]);
        let x0 = [0.5, 0.5];
        let out = ls.run(run.evaluator_mut(), &x0, ellipse(&x0), 0.5, &[]);
        assert_eq!(out.stop, LocalStop::Converged);
        let (x, f) = (out.x, out.f);
        assert!(f < 1e-6, "f = {f}");
        assert_abs_diff_eq!(x[0], 0.31, epsilon = 1e-3);
        assert_abs_diff_eq!(x[1], 0.62, epsilon = 1e-3);
        assert!(run.counters().evaluations <= cfg.local_max_steps);
    }

    #[test]
    fn test_run_with_identity_prior_descends() {
        let mut run = ellipse_run(500);
        let cfg = run.config().clone();
        let ls = LocalSearch::new(&cfg, None, &[1.0, 1.0]);
        let x0 = [0.5, 0.5];
        let f0 = ellipse(&x0);
        let LocalOutcome { x, f, .. } = ls.run(run.evaluator_mut(), &x0, f0, 0.5, &[]);
        assert!(f < 0.1 * f0, "f = {f}");
        assert_abs_diff_eq!(ellipse(&x), f, epsilon = 1e-15);
    }

    #[test]
    fn test_run_respects_budget() {
        let opts = McsOptions {
            max_feval: Some(5),
            ..Default::default()
        };
        let mut run = Mcs::new(|x: &[f64]| x[0] * x[0], &vec![(-1.0, 1.0)], opts).unwrap();
        let cfg = run.config().clone();
        let ls = LocalSearch::new(&cfg, None, &[2.0]);
        let out = ls.run(run.evaluator_mut(), &[0.9], 0.64, 0.1, &[]);
        assert!(out.f <= 0.64);
        assert_eq!(out.stop, LocalStop::Truncated);
        assert!(!out.converged());
        assert_eq!(run.counters().evaluations, 5);
    }
}
