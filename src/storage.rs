//! Box storage: every box of a run, grouped by level.
//!
//! Boxes live in an arena (`Vec<McsBox>`) and are addressed by their index. A box is
//! never removed; splitting retires it and its children are appended. For each level
//! the store keeps the ids of the boxes that may still be split, so a sweep can ask
//! for the best splittable box at level `s` without scanning the whole arena.
//!
//! All coordinates in this module are normalized to the unit cube `[0, 1]^n`.

/// Lifecycle of a box in the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxState {
    /// Eligible for splitting.
    Splittable,
    /// Already split; its children cover it.
    Retired,
    /// At `smax`, or too thin to split along any coordinate. Never split.
    Terminal,
}

/// A hyperrectangle of the search space with one evaluated representative point.
#[derive(Debug, Clone)]
pub struct McsBox {
    /// Index in the store's arena.
    pub id: usize,
    /// Box this one was split from (`None` for the root).
    pub parent: Option<usize>,
    /// Children, in increasing order along `split_dim`. Empty until split.
    pub children: Vec<usize>,
    /// Depth in the splitting hierarchy, `0..=smax`.
    pub level: usize,
    /// Lower corner.
    pub lo: Vec<f64>,
    /// Upper corner.
    pub hi: Vec<f64>,
    /// Representative point, inside `[lo, hi]`.
    pub x: Vec<f64>,
    /// Objective value at `x` as returned by the objective (may be non-finite).
    pub f: f64,
    /// Number of splits along this box's ancestry; drives the round-robin choice of
    /// split coordinate.
    pub split_count: usize,
    /// Coordinate this box was split along, once retired.
    pub split_dim: Option<usize>,
    pub state: BoxState,
}

impl McsBox {
    /// Create an unsplit box. `id` is assigned on insertion.
    pub fn new(
        parent: Option<usize>,
        level: usize,
        lo: Vec<f64>,
        hi: Vec<f64>,
        x: Vec<f64>,
        f: f64,
        split_count: usize,
    ) -> Self {
        debug_assert_eq!(lo.len(), hi.len());
        debug_assert_eq!(lo.len(), x.len());
        Self {
            id: 0,
            parent,
            children: Vec::new(),
            level,
            lo,
            hi,
            x,
            f,
            split_count,
            split_dim: None,
            state: BoxState::Splittable,
        }
    }

    /// Value used for ranking: non-finite values rank as `+inf`.
    #[inline]
    pub fn rank_value(&self) -> f64 {
        rank_value(self.f)
    }

    /// Side length along coordinate `i`.
    #[inline]
    pub fn width(&self, i: usize) -> f64 {
        self.hi[i] - self.lo[i]
    }

    /// Half of the longest side.
    pub fn max_half_width(&self) -> f64 {
        (0..self.lo.len())
            .map(|i| self.width(i))
            .fold(0.0_f64, f64::max)
            * 0.5
    }

    /// Returns true if `x` lies inside the closed box.
    pub fn contains(&self, x: &[f64]) -> bool {
        x.iter()
            .enumerate()
            .all(|(i, &xi)| xi >= self.lo[i] && xi <= self.hi[i])
    }
}

/// Map an objective value onto the ranking scale (`NaN` and `±inf` become `+inf`).
#[inline]
pub fn rank_value(f: f64) -> f64 {
    if f.is_finite() {
        f
    } else {
        f64::INFINITY
    }
}

/// Owner of all boxes of a run.
#[derive(Debug)]
pub struct PartitionStore {
    /// Number of dimensions.
    pub dim: usize,
    /// Maximum level. Boxes inserted at this level are terminal.
    pub smax: usize,
    boxes: Vec<McsBox>,
    /// `levels[s]` = ids of the splittable boxes at level `s`, for `s < smax`.
    levels: Vec<Vec<usize>>,
}

impl PartitionStore {
    pub fn new(dim: usize, smax: usize) -> Self {
        Self {
            dim,
            smax,
            boxes: Vec::new(),
            levels: vec![Vec::new(); smax],
        }
    }

    /// Add a box, returning its id.
    ///
    /// A box whose level reaches `smax` is stored as terminal; its level is capped.
    pub fn insert(&mut self, mut b: McsBox) -> usize {
        let id = self.boxes.len();
        b.id = id;
        if b.level >= self.smax {
            b.level = self.smax;
            b.state = BoxState::Terminal;
        }
        if b.state == BoxState::Splittable {
            self.levels[b.level].push(id);
        }
        if let Some(parent) = b.parent {
            self.boxes[parent].children.push(id);
        }
        self.boxes.push(b);
        id
    }

    #[inline]
    pub fn get(&self, id: usize) -> &McsBox {
        &self.boxes[id]
    }

    /// Total number of boxes ever created.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// All boxes, in creation order.
    pub fn boxes(&self) -> impl Iterator<Item = &McsBox> {
        self.boxes.iter()
    }

    /// Splittable boxes at `level`, in insertion order.
    pub fn splittable_at_level(&self, level: usize) -> impl Iterator<Item = &McsBox> {
        self.levels
            .get(level)
            .into_iter()
            .flat_map(move |ids| ids.iter().map(move |&id| &self.boxes[id]))
    }

    /// The splittable box at `level` with the lowest rank value. Ties go to the
    /// older box.
    pub fn best_at_level(&self, level: usize) -> Option<usize> {
        self.splittable_at_level(level)
            .min_by(|a, b| {
                a.rank_value()
                    .total_cmp(&b.rank_value())
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|b| b.id)
    }

    /// Number of boxes that can still be split.
    pub fn n_splittable(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Returns true if no box can be split any more.
    pub fn is_exhausted(&self) -> bool {
        self.levels.iter().all(Vec::is_empty)
    }

    /// Mark a box as split. It leaves the splittable pool for good.
    pub fn retire(&mut self, id: usize, split_dim: usize) {
        self.remove_from_level(id);
        let b = &mut self.boxes[id];
        b.state = BoxState::Retired;
        b.split_dim = Some(split_dim);
    }

    /// Mark a box as permanently unsplittable.
    pub fn mark_terminal(&mut self, id: usize) {
        self.remove_from_level(id);
        self.boxes[id].state = BoxState::Terminal;
    }

    fn remove_from_level(&mut self, id: usize) {
        let level = self.boxes[id].level;
        if let Some(ids) = self.levels.get_mut(level) {
            if let Some(pos) = ids.iter().position(|&k| k == id) {
                ids.remove(pos);
            }
        }
    }

    /// The best box (lowest rank value, then oldest) among those accepted by `pred`.
    pub fn best_matching<P>(&self, mut pred: P) -> Option<usize>
    where
        P: FnMut(&McsBox) -> bool,
    {
        self.boxes
            .iter()
            .filter(|b| pred(b))
            .min_by(|a, b| {
                a.rank_value()
                    .total_cmp(&b.rank_value())
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|b| b.id)
    }

    /// Check that every split box is tiled by its children.
    ///
    /// Children must be ordered along the split coordinate, share faces exactly,
    /// start and end on the parent's faces, match the parent on every other
    /// coordinate, and hold their representative point. Returns a description of the
    /// first violation.
    pub fn verify_tiling(&self) -> Option<String> {
        for parent in &self.boxes {
            if parent.children.is_empty() {
                continue;
            }
            let Some(d) = parent.split_dim else {
                return Some(format!("box {} has children but no split dim", parent.id));
            };
            let mut edge = parent.lo[d];
            for &cid in &parent.children {
                let child = &self.boxes[cid];
                if child.level != (parent.level + 1).min(self.smax) {
                    return Some(format!("box {cid}: level {} under {}", child.level, parent.level));
                }
                if child.lo[d] != edge {
                    return Some(format!("box {cid}: gap or overlap along dim {d}"));
                }
                if child.hi[d] <= child.lo[d] {
                    return Some(format!("box {cid}: empty along dim {d}"));
                }
                edge = child.hi[d];
                for i in (0..self.dim).filter(|&i| i != d) {
                    if child.lo[i] != parent.lo[i] || child.hi[i] != parent.hi[i] {
                        return Some(format!("box {cid}: differs from parent along dim {i}"));
                    }
                }
                if !child.contains(&child.x) {
                    return Some(format!("box {cid}: representative outside box"));
                }
            }
            if edge != parent.hi[d] {
                return Some(format!("box {}: children stop short of upper face", parent.id));
            }
        }
        None
    }
}
