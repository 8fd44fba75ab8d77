//! The growing palette of color subclusters: soft association, refinement,
//! and the split/condense growth mechanism.

use glam::DVec3;
use rayon::prelude::*;
use tracing::debug;

use crate::{
    color::Color,
    constants::{SUBCLUSTER_PERTURBATION, SUBCLUSTER_SPLIT_THRESHOLD},
    eigen,
};

/// `c`, `pairs`, `π`, `q`, `L`, `K`, and `A` together — everything
/// association/refinement/expansion touch.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<Color>,
    pairs: Option<Vec<(usize, usize)>>,
    priors: Vec<f64>,
    /// `associations[i][s] = q[i][s]`.
    associations: Vec<Vec<f64>>,
    locks: Vec<bool>,
    /// `constraints[s] = K[s]`, raw indices into `colors`.
    constraints: Vec<Vec<usize>>,
    /// `assignment[s] = A[s]`, a raw index into `colors`.
    assignment: Vec<usize>,
    maxed: bool,
}

impl Palette {
    /// Seed the two initial subclusters: `c0` is the
    /// mean color of the whole image, `c1 = c0 + ε·v` along the dominant
    /// eigenvector of the input's color spread, `π = {0.5, 0.5}`, and a
    /// single pair `(0, 1)`.
    pub fn seed(c0: Color, principal_axis: DVec3, superpixel_count: usize) -> Self {
        let mut c1 = c0;
        c1.perturb(principal_axis * SUBCLUSTER_PERTURBATION);

        Palette {
            colors: vec![c0, c1],
            pairs: Some(vec![(0, 1)]),
            priors: vec![0.5, 0.5],
            associations: vec![vec![0.5; superpixel_count]; 2],
            locks: vec![false, false],
            constraints: vec![Vec::new(); superpixel_count],
            assignment: vec![0; superpixel_count],
            maxed: false,
        }
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn priors(&self) -> &[f64] {
        &self.priors
    }

    pub fn locks(&self) -> &[bool] {
        &self.locks
    }

    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    pub fn constraints(&self) -> &[Vec<usize>] {
        &self.constraints
    }

    pub fn pairs(&self) -> Option<&[(usize, usize)]> {
        self.pairs.as_deref()
    }

    pub fn is_maxed(&self) -> bool {
        self.maxed
    }

    pub fn raw_len(&self) -> usize {
        self.colors.len()
    }

    /// The effective (user-visible) palette size: `|pairs|` while growing,
    /// `|c|` once maxed.
    pub fn effective_len(&self) -> usize {
        if self.maxed {
            self.colors.len()
        } else {
            self.pairs.as_ref().map_or(self.colors.len(), |p| p.len())
        }
    }

    pub fn set_lock(&mut self, index: usize, locked: bool) {
        self.locks[index] = locked;
    }

    pub fn set_constraint(&mut self, superpixel: usize, indices: Vec<usize>) {
        self.constraints[superpixel] = indices;
    }

    /// The `|pairs|`-entry (or, once maxed, `|c|`-entry) palette exposed to
    /// segmentation and output: the `π`-weighted average of each pair's two
    /// subclusters.
    pub fn averaged_palette(&self) -> Vec<Color> {
        match &self.pairs {
            Some(pairs) if !self.maxed => pairs
                .iter()
                .map(|&(a, b)| {
                    let total = self.priors[a] + self.priors[b];
                    if total > 0.0 {
                        (self.colors[a] * self.priors[a] + self.colors[b] * self.priors[b])
                            / total
                    } else {
                        (self.colors[a] + self.colors[b]) / 2.0
                    }
                })
                .collect(),
            _ => self.colors.clone(),
        }
    }

    /// Map an effective palette index to its raw `colors` index, for
    /// callers (segmentation, pixel constraints) that address the
    /// user-visible palette before condensation.
    pub fn raw_index_of_effective(&self, effective: usize) -> usize {
        match &self.pairs {
            Some(pairs) if !self.maxed => pairs[effective].0,
            _ => effective,
        }
    }

    /// The averaged color for every *raw* subcluster index (length `|c|`):
    /// both subclusters of a pair map to the same pair-averaged color. This
    /// is what segmentation indexes with `A[x,y]`, which ranges over raw
    /// subcluster indices even while the user-visible palette only exposes
    /// `|pairs|` entries.
    pub fn averaged_palette_by_raw_index(&self) -> Vec<Color> {
        if self.maxed {
            return self.colors.clone();
        }
        let mut out = vec![Color::BLACK; self.colors.len()];
        if let Some(pairs) = &self.pairs {
            for &(a, b) in pairs {
                let total = self.priors[a] + self.priors[b];
                let avg = if total > 0.0 {
                    (self.colors[a] * self.priors[a] + self.colors[b] * self.priors[b]) / total
                } else {
                    (self.colors[a] + self.colors[b]) / 2.0
                };
                out[a] = avg;
                out[b] = avg;
            }
        }
        out
    }

    /// Set the color of an *effective* palette slot. Before condensation
    /// this writes through to both subclusters of the underlying pair, so
    /// the user-visible color change is immediately reflected regardless of
    /// which subcluster segmentation or refinement currently favors.
    pub fn set_effective_color(&mut self, effective_index: usize, color: Color) {
        match &self.pairs {
            Some(pairs) if !self.maxed => {
                let (a, b) = pairs[effective_index];
                self.colors[a] = color;
                self.colors[b] = color;
            }
            _ => self.colors[effective_index] = color,
        }
    }

    /// Lock/unlock an *effective* palette slot, again writing through both
    /// subclusters of its pair before condensation.
    pub fn set_effective_lock(&mut self, effective_index: usize, locked: bool) {
        match &self.pairs {
            Some(pairs) if !self.maxed => {
                let (a, b) = pairs[effective_index];
                self.locks[a] = locked;
                self.locks[b] = locked;
            }
            _ => self.locks[effective_index] = locked,
        }
    }

    /// Rebuild a palette from a [`crate::state::State`]'s retained fields,
    /// as when restoring a history snapshot. `q` is not part of a snapshot;
    /// it is reallocated to zero and repopulated by the next `associate`
    /// call.
    pub fn from_state(
        colors: Vec<Color>,
        pairs: Option<Vec<(usize, usize)>>,
        priors: Vec<f64>,
        locks: Vec<bool>,
        constraints: Vec<Vec<usize>>,
        assignment: Vec<usize>,
        superpixel_count: usize,
    ) -> Self {
        let n_sub = colors.len();
        Palette {
            maxed: pairs.is_none(),
            colors,
            pairs,
            priors,
            associations: vec![vec![0.0; superpixel_count]; n_sub],
            locks,
            constraints,
            assignment,
        }
    }

    /// Soft-assign every superpixel to every candidate subcluster under the
    /// Gibbs distribution at `temperature`, pick the hard MAP assignment by
    /// minimum color distance, and re-accumulate `π` from zero.
    pub fn associate(&mut self, mu_col: &[Color], rho: &[f64], temperature: f64) {
        let n_sub = self.colors.len();
        let n_sp = mu_col.len();

        if self.associations.len() != n_sub {
            self.associations.resize_with(n_sub, || vec![0.0; n_sp]);
        }
        for row in self.associations.iter_mut() {
            row.resize(n_sp, 0.0);
        }
        self.assignment.resize(n_sp, 0);

        let colors = &self.colors;
        let priors = &self.priors;
        let constraints = &self.constraints;

        let per_superpixel: Vec<(Vec<(usize, f64)>, usize)> = (0..n_sp)
            .into_par_iter()
            .map(|s| {
                let candidates: &[usize] = if constraints[s].is_empty() {
                    &[]
                } else {
                    &constraints[s]
                };
                let candidate_iter: Box<dyn Iterator<Item = usize>> = if candidates.is_empty() {
                    Box::new(0..n_sub)
                } else {
                    Box::new(candidates.iter().copied())
                };
                let candidates: Vec<usize> = candidate_iter.collect();

                let weighted: Vec<f64> = candidates
                    .iter()
                    .map(|&i| priors[i] * (-colors[i].distance(mu_col[s]) / temperature).exp())
                    .collect();
                let sum: f64 = weighted.iter().sum();

                let q_vals: Vec<(usize, f64)> = candidates
                    .iter()
                    .zip(&weighted)
                    .map(|(&i, &w)| (i, if sum > 0.0 { w / sum } else { 0.0 }))
                    .collect();

                let best = candidates
                    .iter()
                    .copied()
                    .min_by(|&a, &b| {
                        colors[a]
                            .distance(mu_col[s])
                            .total_cmp(&colors[b].distance(mu_col[s]))
                    })
                    .unwrap_or(0);

                (q_vals, best)
            })
            .collect();

        let mut new_priors = vec![0.0; n_sub];
        for (s, (q_vals, best)) in per_superpixel.into_iter().enumerate() {
            for row in self.associations.iter_mut() {
                row[s] = 0.0;
            }
            for (i, q) in q_vals {
                self.associations[i][s] = q;
                new_priors[i] += rho[s] * q;
            }
            self.assignment[s] = best;
        }
        self.priors = new_priors;
    }

    /// Move each unlocked subcluster to the `π`-normalized, `q`-weighted
    /// mean of the superpixels that associate with it; return total
    /// movement.
    pub fn refine(&mut self, mu_col: &[Color], rho: &[f64]) -> f64 {
        let n_sub = self.colors.len();
        let colors = &self.colors;
        let locks = &self.locks;
        let priors = &self.priors;
        let associations = &self.associations;

        let updated: Vec<Option<Color>> = (0..n_sub)
            .into_par_iter()
            .map(|i| {
                if locks[i] || priors[i] <= 0.0 {
                    return None;
                }
                let sum: Color = mu_col
                    .iter()
                    .zip(rho)
                    .zip(&associations[i])
                    .map(|((&c, &r), &q)| c * (r * q))
                    .sum();
                Some(sum / priors[i])
            })
            .collect();

        let mut err = 0.0;
        for (i, new_color) in updated.into_iter().enumerate() {
            if let Some(c) = new_color {
                err += colors[i].distance(c);
                self.colors[i] = c;
            }
        }
        err
    }

    /// The weighted, centered-at-`c_i` absolute-outer-product covariance
    /// used both for subcluster perturbation direction and (with a uniform
    /// weight) for the initial temperature bound.
    pub fn max_eigen(&self, i: usize, mu_col: &[Color]) -> (DVec3, f64) {
        if self.priors[i] <= 0.0 {
            return (DVec3::ZERO, 0.0);
        }
        let n = mu_col.len() as f64;
        let weights: Vec<f64> = self.associations[i]
            .iter()
            .map(|&q| q * (1.0 / n) / self.priors[i])
            .collect();
        let matrix = eigen::weighted_abs_outer_product(self.colors[i], mu_col, &weights);
        eigen::max_eigen(matrix)
    }

    /// Split overgrown pairs and re-perturb stale ones; condense once `|c|`
    /// reaches `2P`.
    pub fn expand(&mut self, mu_col: &[Color], target_size: usize) {
        if self.maxed {
            return;
        }

        let pairs = self.pairs.clone().expect("pairs present while not maxed");
        let mut split_candidates: Vec<(f64, usize)> = Vec::new();

        for (pair_idx, &(a, b)) in pairs.iter().enumerate() {
            let distance = self.colors[a].distance(self.colors[b]);
            if distance > SUBCLUSTER_SPLIT_THRESHOLD {
                split_candidates.push((distance, pair_idx));
            } else {
                let (axis_a, _) = self.max_eigen(a, mu_col);
                self.colors[b].perturb(axis_a * SUBCLUSTER_PERTURBATION);
            }
        }

        split_candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        for &(distance, pair_idx) in split_candidates.iter().rev() {
            debug!(pair_idx, distance, "splitting subcluster pair");
            self.split_pair(pair_idx, mu_col);
            if self.colors.len() >= 2 * target_size {
                self.condense();
                return;
            }
        }
    }

    fn split_pair(&mut self, pair_idx: usize, mu_col: &[Color]) {
        let (a, b) = self.pairs.as_ref().unwrap()[pair_idx];

        let (axis_a, _) = self.max_eigen(a, mu_col);
        let (axis_b, _) = self.max_eigen(b, mu_col);

        let n1 = self.colors.len();
        let mut c_a_prime = self.colors[a];
        c_a_prime.perturb(axis_a * SUBCLUSTER_PERTURBATION);
        self.colors.push(c_a_prime);

        let n2 = self.colors.len();
        let mut c_b_prime = self.colors[b];
        c_b_prime.perturb(axis_b * SUBCLUSTER_PERTURBATION);
        self.colors.push(c_b_prime);

        self.priors[a] /= 2.0;
        self.priors[b] /= 2.0;
        self.priors.push(self.priors[a]);
        self.priors.push(self.priors[b]);

        self.locks.push(self.locks[a]);
        self.locks.push(self.locks[b]);

        let row_a = self.associations[a].clone();
        let row_b = self.associations[b].clone();
        self.associations.push(row_a);
        self.associations.push(row_b);

        let pairs = self.pairs.as_mut().unwrap();
        pairs[pair_idx] = (a, n1);
        pairs.push((b, n2));
    }

    /// Collapse every pair into a single prior-weighted color, discard
    /// `pairs`, and freeze the palette at exactly `P` entries.
    pub fn condense(&mut self) {
        let pairs = self.pairs.take().expect("condense called without pairs");
        debug!(pair_count = pairs.len(), "condensing palette");

        let mut new_colors = Vec::with_capacity(pairs.len());
        let mut new_priors = Vec::with_capacity(pairs.len());
        let mut new_locks = Vec::with_capacity(pairs.len());
        let mut new_associations = Vec::with_capacity(pairs.len());
        let mut remap = vec![0usize; self.colors.len()];

        for (j, &(a, b)) in pairs.iter().enumerate() {
            let total = self.priors[a] + self.priors[b];
            let (w_a, w_b) = if total > 0.0 {
                (self.priors[a] / total, self.priors[b] / total)
            } else {
                (0.5, 0.5)
            };
            new_colors.push(self.colors[a] * w_a + self.colors[b] * w_b);
            new_priors.push(total);
            new_locks.push(self.locks[a] || self.locks[b]);
            new_associations.push(self.associations[a].clone());
            remap[a] = j;
            remap[b] = j;
        }

        for a in self.assignment.iter_mut() {
            *a = remap[*a];
        }
        for constraint in self.constraints.iter_mut() {
            for index in constraint.iter_mut() {
                *index = remap[*index];
            }
        }

        self.colors = new_colors;
        self.priors = new_priors;
        self.locks = new_locks;
        self.associations = new_associations;
        self.maxed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(n_sp: usize) -> Palette {
        Palette::seed(Color::new(50.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0), n_sp)
    }

    #[test]
    fn averaged_palette_is_prior_weighted_mean_before_condense() {
        let mut p = seeded(2);
        p.priors = vec![0.25, 0.75];
        let avg = p.averaged_palette();
        assert_eq!(avg.len(), 1);
        let expected = p.colors[0] * 0.25 + p.colors[1] * 0.75;
        assert!((avg[0].distance(expected)).abs() < 1e-9);
    }

    #[test]
    fn hard_assignment_uses_min_distance_not_max_prior() {
        let mut p = seeded(1);
        // Skew priors so the posterior-maximizing choice would be index 1,
        // but index 0 is the closer color and must win.
        p.priors = vec![0.01, 0.99];
        p.colors = vec![Color::new(50.0, 0.0, 0.0), Color::new(80.0, 0.0, 0.0)];
        let mu_col = vec![Color::new(51.0, 0.0, 0.0)];
        let rho = vec![1.0];
        p.associate(&mu_col, &rho, 10.0);
        assert_eq!(p.assignment()[0], 0);
    }

    #[test]
    fn pixel_constraint_forces_assignment() {
        let mut p = seeded(1);
        p.set_constraint(0, vec![1]);
        let mu_col = vec![Color::new(50.0, 0.0, 0.0)];
        let rho = vec![1.0];
        p.associate(&mu_col, &rho, 10.0);
        assert_eq!(p.assignment()[0], 1);
    }

    #[test]
    fn locked_color_is_unchanged_by_refine() {
        let mut p = seeded(1);
        p.set_lock(0, true);
        let before = p.colors()[0];
        p.priors = vec![1.0, 0.0];
        p.associations = vec![vec![1.0], vec![0.0]];
        p.refine(&[Color::new(90.0, 5.0, 5.0)], &[1.0]);
        assert_eq!(p.colors()[0], before);
    }

    #[test]
    fn condense_freezes_palette_at_pair_count() {
        let mut p = seeded(1);
        p.condense();
        assert!(p.is_maxed());
        assert_eq!(p.effective_len(), 1);
        assert!(p.pairs().is_none());
    }
}
