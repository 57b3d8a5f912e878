//! Best point seen so far and the list of distinct local minima.
//!
//! Points are stored in unit-cube coordinates; the driver maps them back to caller
//! coordinates when the result is assembled.

use crate::storage::rank_value;

/// A local minimum in unit-cube coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitMinimum {
    pub x: Vec<f64>,
    pub f: f64,
}

/// Tracks the incumbent and the distinct local minima of a run.
#[derive(Debug, Clone)]
pub struct IncumbentSet {
    best: Option<(Vec<f64>, f64)>,
    minima: Vec<UnitMinimum>,
    /// Per-coordinate tolerance under which two minima are the same.
    tol: f64,
    /// Euclidean radius of the basin claimed by a known minimum.
    basin_radius: f64,
    max_minima: usize,
}

impl IncumbentSet {
    pub fn new(tol: f64, basin_radius: f64, max_minima: usize) -> Self {
        Self {
            best: None,
            minima: Vec::new(),
            tol,
            basin_radius,
            max_minima: max_minima.max(1),
        }
    }

    /// Offer an evaluated point. Returns true if it became the new incumbent.
    ///
    /// Values are compared on the ranking scale, so a non-finite value never replaces
    /// a finite incumbent. The very first point is always taken.
    pub fn observe(&mut self, x: &[f64], f: f64) -> bool {
        let improves = match &self.best {
            None => true,
            Some((_, fb)) => rank_value(f) < rank_value(*fb),
        };
        if improves {
            self.best = Some((x.to_vec(), f));
        }
        improves
    }

    /// Incumbent point and value.
    pub fn best(&self) -> Option<(&[f64], f64)> {
        self.best.as_ref().map(|(x, f)| (x.as_slice(), *f))
    }

    /// Incumbent value on the ranking scale, `+inf` before the first observation.
    pub fn best_value(&self) -> f64 {
        self.best.as_ref().map_or(f64::INFINITY, |(_, f)| rank_value(*f))
    }

    /// Record the end point of a local search.
    ///
    /// A point within `tol` of a known minimum on every coordinate, or inside its
    /// basin radius, is merged into the nearest such minimum, keeping whichever of the
    /// two is lower. Otherwise it is inserted and the list is kept sorted by value and
    /// capped at `max_minima` entries. Non-finite values are not recorded. Returns
    /// true if a new entry was created.
    pub fn record_local_minimum(&mut self, x: &[f64], f: f64) -> bool {
        if !f.is_finite() {
            return false;
        }
        let (tol, r2) = (self.tol, self.basin_radius * self.basin_radius);
        if let Some(existing) = self
            .minima
            .iter_mut()
            .filter(|m| coincide(&m.x, x, tol) || distance2(&m.x, x) <= r2)
            .min_by(|a, b| distance2(&a.x, x).total_cmp(&distance2(&b.x, x)))
        {
            if f < existing.f {
                existing.x = x.to_vec();
                existing.f = f;
                self.sort();
            }
            return false;
        }
        self.minima.push(UnitMinimum { x: x.to_vec(), f });
        self.sort();
        self.minima.truncate(self.max_minima);
        true
    }

    /// Returns true if `x` is within Euclidean distance `radius` of a known minimum.
    pub fn near_known_minimum(&self, x: &[f64], radius: f64) -> bool {
        let r2 = radius * radius;
        self.minima.iter().any(|m| distance2(&m.x, x) <= r2)
    }

    /// Known minima, best first.
    pub fn minima(&self) -> &[UnitMinimum] {
        &self.minima
    }

    fn sort(&mut self) {
        self.minima.sort_by(|a, b| a.f.total_cmp(&b.f));
    }
}

fn coincide(a: &[f64], b: &[f64], tol: f64) -> bool {
    a.iter().zip(b).all(|(p, q)| (p - q).abs() <= tol)
}

fn distance2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(p, q)| (p - q) * (p - q)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_keeps_minimum() {
        let mut inc = IncumbentSet::new(1e-4, 0.0, 10);
        assert!(inc.observe(&[0.5], 3.0));
        assert!(!inc.observe(&[0.1], 4.0));
        assert!(inc.observe(&[0.2], 1.0));
        assert!(!inc.observe(&[0.3], 1.0));
        let (x, f) = inc.best().unwrap();
        assert_eq!(x, &[0.2]);
        assert_eq!(f, 1.0);
    }

    #[test]
    fn test_observe_non_finite() {
        let mut inc = IncumbentSet::new(1e-4, 0.0, 10);
        assert!(inc.observe(&[0.5], f64::NAN));
        assert_eq!(inc.best_value(), f64::INFINITY);
        assert!(!inc.observe(&[0.4], f64::INFINITY));
        assert!(inc.observe(&[0.3], 7.0));
        assert!(!inc.observe(&[0.2], f64::NEG_INFINITY));
        assert_eq!(inc.best_value(), 7.0);
    }

    #[test]
    fn test_minima_are_deduplicated() {
        let mut inc = IncumbentSet::new(1e-3, 0.0, 10);
        assert!(inc.record_local_minimum(&[0.25, 0.25], -1.0));
        assert!(!inc.record_local_minimum(&[0.2505, 0.2495], -1.1));
        assert_eq!(inc.minima().len(), 1);
        assert_eq!(inc.minima()[0].f, -1.1);
        assert_eq!(inc.minima()[0].x, vec![0.2505, 0.2495]);

        // A worse duplicate leaves the entry alone.
        assert!(!inc.record_local_minimum(&[0.25, 0.25], 5.0));
        assert_eq!(inc.minima()[0].f, -1.1);
    }

    #[test]
    fn test_minima_sorted_and_capped() {
        let mut inc = IncumbentSet::new(1e-6, 0.0, 2);
        inc.record_local_minimum(&[0.1], 3.0);
        inc.record_local_minimum(&[0.5], 1.0);
        inc.record_local_minimum(&[0.9], 2.0);
        let values: Vec<f64> = inc.minima().iter().map(|m| m.f).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_non_finite_minimum_is_ignored() {
        let mut inc = IncumbentSet::new(1e-6, 0.0, 4);
        assert!(!inc.record_local_minimum(&[0.1], f64::NAN));
        assert!(inc.minima().is_empty());
    }

    #[test]
    fn test_near_known_minimum() {
        let mut inc = IncumbentSet::new(1e-6, 0.0, 4);
        inc.record_local_minimum(&[0.5, 0.5], 0.0);
        assert!(inc.near_known_minimum(&[0.55, 0.5], 0.1));
        assert!(!inc.near_known_minimum(&[0.6, 0.6], 0.1));
        assert!(!inc.near_known_minimum(&[0.55, 0.5], 0.0));
    }

    #[test]
    fn test_end_point_inside_basin_is_merged() {
        let mut inc = IncumbentSet::new(1e-4, 0.1, 10);
        assert!(inc.record_local_minimum(&[0.3, 0.2], 2e-14));
        // Same basin, stopped a little short of the bottom.
        assert!(!inc.record_local_minimum(&[0.3005, 0.1996], 6.7e-7));
        assert_eq!(inc.minima().len(), 1);
        assert_eq!(inc.minima()[0].x, vec![0.3, 0.2]);

        // A better end point in the basin replaces the entry.
        assert!(!inc.record_local_minimum(&[0.2487, 0.2451], -1.0));
        assert_eq!(inc.minima().len(), 1);
        assert_eq!(inc.minima()[0].f, -1.0);

        // Outside the radius it is a new basin.
        assert!(inc.record_local_minimum(&[0.75, 0.75], -0.8));
        assert_eq!(inc.minima().len(), 2);
    }

    #[test]
    fn test_merge_picks_nearest_minimum() {
        let mut inc = IncumbentSet::new(1e-6, 0.3, 10);
        inc.record_local_minimum(&[0.1], 1.0);
        inc.record_local_minimum(&[0.5], 2.0);
        assert_eq!(inc.minima().len(), 2);
        // Inside both radii; closer to 0.5.
        assert!(!inc.record_local_minimum(&[0.35], 0.5));
        let values: Vec<f64> = inc.minima().iter().map(|m| m.f).collect();
        assert_eq!(values, vec![0.5, 1.0]);
        assert_eq!(inc.minima()[0].x, vec![0.35]);
        assert_eq!(inc.minima()[1].x, vec![0.1]);
    }
}
