//! The superpixel grid: positions, mean colors, and importance weights for
//! the `w×h` output cells, plus the segmentation and smoothing passes that
//! keep them in sync with the input image.

use glam::{DVec2, IVec2, UVec2};
use rayon::prelude::*;

use crate::{color::Color, image::LabImage, image::WeightMap};

const LAPLACIAN_NEIGHBORS: [IVec2; 4] = [
    IVec2::new(0, 1),
    IVec2::new(0, -1),
    IVec2::new(-1, 0),
    IVec2::new(1, 0),
];

const BILATERAL_WINDOW: [IVec2; 9] = [
    IVec2::new(-1, -1),
    IVec2::new(-1, 0),
    IVec2::new(-1, 1),
    IVec2::new(0, -1),
    IVec2::new(0, 0),
    IVec2::new(0, 1),
    IVec2::new(1, -1),
    IVec2::new(1, 0),
    IVec2::new(1, 1),
];

/// The expected linear radius of a superpixel in input-image space.
pub fn search_range(in_size: UVec2, out_size: UVec2) -> f64 {
    ((in_size.x as f64 / out_size.x as f64) * (in_size.y as f64 / out_size.y as f64)).sqrt()
}

/// Nearest-grid-cell assignment of every input pixel to a superpixel; also
/// used as the fallback when segmentation leaves a pixel unreached.
pub fn regular_region_map(in_size: UVec2, out_size: UVec2) -> Vec<UVec2> {
    (0..(in_size.x * in_size.y))
        .map(|idx| {
            let coord = UVec2::new(idx % in_size.x, idx / in_size.x);
            UVec2::new(
                (coord.x * out_size.x) / in_size.x,
                (coord.y * out_size.y) / in_size.y,
            )
        })
        .collect()
}

/// The mean color of every region under a region map, kept separate from
/// [`SuperpixelGrid::update_means`] since initialization only wants the
/// color mean, never a position recentering.
pub fn initial_mean_colors(input: &LabImage, region_map: &[UVec2], out_size: UVec2) -> Vec<Color> {
    let count = (out_size.x * out_size.y) as usize;
    let mut sum = vec![Color::BLACK; count];
    let mut n = vec![0u32; count];

    for (idx, owner) in region_map.iter().enumerate() {
        let sp = (owner.x + out_size.x * owner.y) as usize;
        sum[sp] += input.pixels()[idx];
        n[sp] += 1;
    }

    sum.into_iter()
        .zip(n)
        .map(|(sum, n)| if n > 0 { sum / n as f64 } else { Color::BLACK })
        .collect()
}

/// The `w×h` grid of superpixels: centroid position, mean color, and
/// normalized importance weight (`ρ`).
#[derive(Debug, Clone)]
pub struct SuperpixelGrid {
    size: UVec2,
    positions: Vec<DVec2>,
    colors: Vec<Color>,
    weights: Vec<f64>,
}

impl SuperpixelGrid {
    /// Place `out_size.x · out_size.y` superpixels on a regular grid over
    /// `in_size`, each colored `init_color` (the caller overwrites it once
    /// the palette mean is known).
    pub fn new(out_size: UVec2, in_size: UVec2, init_color: Color) -> Self {
        let count = (out_size.x * out_size.y) as usize;
        let mut positions = Vec::with_capacity(count);
        for y in 0..out_size.y {
            for x in 0..out_size.x {
                positions.push(DVec2::new(
                    (x as f64 + 0.5) * in_size.x as f64 / out_size.x as f64,
                    (y as f64 + 0.5) * in_size.y as f64 / out_size.y as f64,
                ));
            }
        }
        SuperpixelGrid {
            size: out_size,
            positions,
            colors: vec![init_color; count],
            weights: vec![1.0 / count as f64; count],
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[DVec2] {
        &self.positions
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Overwrite every superpixel's color, e.g. with freshly computed
    /// initial region means, or when restoring a history snapshot.
    pub fn set_colors(&mut self, colors: Vec<Color>) {
        self.colors = colors;
    }

    /// Overwrite every superpixel's position, used when restoring a
    /// history snapshot.
    pub fn set_positions(&mut self, positions: Vec<DVec2>) {
        self.positions = positions;
    }

    fn idx(&self, coord: UVec2) -> usize {
        (coord.x + self.size.x * coord.y) as usize
    }

    /// Reassign every input pixel to the superpixel minimizing the combined
    /// color+spatial SLIC distance, using `averaged_palette[assignment[s]]`
    /// as superpixel `s`'s current color. Pixels outside every superpixel's
    /// search window fall back to the regular grid.
    ///
    /// Iteration order is deterministic (`x` outer, `y` inner over
    /// superpixels; pixel rows outer, columns inner within a window) so the
    /// strict-less-than tie-break always favors the first-seen superpixel.
    pub fn update_mapping(
        &self,
        input: &LabImage,
        averaged_palette: &[Color],
        assignment: &[usize],
        slic_factor: f64,
        range: f64,
    ) -> Vec<UVec2> {
        let in_size = input.size();
        let mut best_distance = vec![f64::INFINITY; (in_size.x * in_size.y) as usize];
        let mut best_owner = vec![None; (in_size.x * in_size.y) as usize];

        for x in 0..self.size.x {
            for y in 0..self.size.y {
                let sp = self.idx(UVec2::new(x, y));
                let sp_color = averaged_palette[assignment[sp]];
                let pos = self.positions[sp];

                let min_x = (pos.x - range).floor().max(0.0) as u32;
                let max_x = ((pos.x + range).ceil() as u32).min(in_size.x.saturating_sub(1));
                let min_y = (pos.y - range).floor().max(0.0) as u32;
                let max_y = ((pos.y + range).ceil() as u32).min(in_size.y.saturating_sub(1));
                if min_x > max_x || min_y > max_y {
                    continue;
                }

                for yy in min_y..=max_y {
                    for xx in min_x..=max_x {
                        let pixel_coord = UVec2::new(xx, yy);
                        let color_dist = input[pixel_coord].distance(sp_color);
                        let spatial_dist = pos.distance(DVec2::new(xx as f64, yy as f64));
                        let d = color_dist + (slic_factor / range) * spatial_dist;

                        let pixel_idx = (xx + in_size.x * yy) as usize;
                        if d < best_distance[pixel_idx] {
                            best_distance[pixel_idx] = d;
                            best_owner[pixel_idx] = Some(UVec2::new(x, y));
                        }
                    }
                }
            }
        }

        let fallback = regular_region_map(in_size, self.size);
        best_owner
            .into_iter()
            .enumerate()
            .map(|(idx, owner)| owner.unwrap_or(fallback[idx]))
            .collect()
    }

    /// Recompute centroid/mean color/importance weight from `region_map`:
    /// uniform average over assigned pixels, the diagonal fallback for an
    /// empty superpixel, then a renormalization of `ρ` to sum to one.
    pub fn update_means(&mut self, input: &LabImage, weights: &WeightMap, region_map: &[UVec2]) {
        let in_size = input.size();
        let count = self.positions.len();

        let mut color_sum = vec![Color::BLACK; count];
        let mut pos_sum = vec![DVec2::ZERO; count];
        let mut member_count = vec![0u32; count];
        let mut rho = vec![0.0f64; count];

        for y in 0..in_size.y {
            for x in 0..in_size.x {
                let coord = UVec2::new(x, y);
                let owner = region_map[(x + in_size.x * y) as usize];
                let sp = self.idx(owner);
                color_sum[sp] += input[coord];
                pos_sum[sp] += DVec2::new(x as f64, y as f64);
                member_count[sp] += 1;
                rho[sp] += weights[coord];
            }
        }

        for y in 0..self.size.y {
            for x in 0..self.size.x {
                let sp = self.idx(UVec2::new(x, y));
                if member_count[sp] == 0 {
                    let fallback_x = ((x as f64 / self.size.x as f64 * in_size.x as f64) as u32)
                        .min(in_size.x.saturating_sub(1));
                    let fallback_y = ((x as f64 / self.size.y as f64 * in_size.y as f64) as u32)
                        .min(in_size.y.saturating_sub(1));
                    self.colors[sp] = input[UVec2::new(fallback_x, fallback_y)];
                } else {
                    self.colors[sp] = color_sum[sp] / member_count[sp] as f64;
                    self.positions[sp] = pos_sum[sp] / member_count[sp] as f64;
                }
            }
        }

        let total_rho: f64 = rho.iter().sum();
        if total_rho > 0.0 {
            for w in rho.iter_mut() {
                *w /= total_rho;
            }
        }
        self.weights = rho;
    }

    /// One Laplacian smoothing pass over positions: `(1-α)·pos +
    /// α·mean(4-neighbors)`, only along axes where both orthogonal
    /// neighbors exist.
    pub fn smooth_positions(&mut self, alpha: f64) {
        let snapshot = self.positions.clone();
        let w = self.size.x as i32;
        let h = self.size.y as i32;

        let smoothed: Vec<DVec2> = (0..self.size.y)
            .into_par_iter()
            .flat_map(|y| {
                let snapshot = &snapshot;
                (0..self.size.x)
                    .into_par_iter()
                    .map(move |x| {
                        let here = IVec2::new(x as i32, y as i32);
                        let mut has_horizontal = true;
                        let mut has_vertical = true;
                        let mut left = DVec2::ZERO;
                        let mut right = DVec2::ZERO;
                        let mut up = DVec2::ZERO;
                        let mut down = DVec2::ZERO;

                        for d in LAPLACIAN_NEIGHBORS {
                            let n = here + d;
                            let in_bounds = n.x >= 0 && n.y >= 0 && n.x < w && n.y < h;
                            if d.x != 0 && !in_bounds {
                                has_horizontal = false;
                            }
                            if d.y != 0 && !in_bounds {
                                has_vertical = false;
                            }
                            if in_bounds {
                                let value = snapshot[(n.x as u32 + w as u32 * n.y as u32) as usize];
                                match (d.x, d.y) {
                                    (-1, 0) => left = value,
                                    (1, 0) => right = value,
                                    (0, -1) => up = value,
                                    (0, 1) => down = value,
                                    _ => {}
                                }
                            }
                        }

                        let original = snapshot[(x + w as u32 * y) as usize];
                        let mut result = original;
                        if has_horizontal {
                            let neighbor_mean = (left + right) / 2.0;
                            result.x = (1.0 - alpha) * original.x + alpha * neighbor_mean.x;
                        }
                        if has_vertical {
                            let neighbor_mean = (up + down) / 2.0;
                            result.y = (1.0 - alpha) * original.y + alpha * neighbor_mean.y;
                        }
                        result
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        self.positions = smoothed;
    }

    /// One bilateral-filter pass over colors within a 3x3 window of
    /// superpixels, reading a stable snapshot and writing a fresh buffer so
    /// results don't depend on iteration order.
    pub fn smooth_colors(&mut self, sigma_color: f64, sigma_pos: f64) {
        let color_snapshot = self.colors.clone();
        let pos_snapshot = self.positions.clone();
        let w = self.size.x as i32;
        let h = self.size.y as i32;

        let smoothed: Vec<Color> = (0..self.size.y)
            .into_par_iter()
            .flat_map(|y| {
                let color_snapshot = &color_snapshot;
                let pos_snapshot = &pos_snapshot;
                (0..self.size.x)
                    .into_par_iter()
                    .map(move |x| {
                        let here = IVec2::new(x as i32, y as i32);
                        let idx = (x + w as u32 * y) as usize;
                        let center_color = color_snapshot[idx];
                        let center_pos = pos_snapshot[idx];

                        let mut accum = Color::BLACK;
                        let mut weight_sum = 0.0;
                        for d in BILATERAL_WINDOW {
                            let n = here + d;
                            if n.x >= 0 && n.y >= 0 && n.x < w && n.y < h {
                                let n_idx = (n.x as u32 + w as u32 * n.y as u32) as usize;
                                let neighbor_color = color_snapshot[n_idx];
                                let neighbor_pos = pos_snapshot[n_idx];

                                let color_weight = gaussian(
                                    center_color.distance(neighbor_color),
                                    sigma_color,
                                );
                                let pos_weight =
                                    gaussian(center_pos.distance(neighbor_pos), sigma_pos);
                                let weight = color_weight * pos_weight;

                                accum += neighbor_color * weight;
                                weight_sum += weight;
                            }
                        }

                        if weight_sum > 0.0 {
                            accum / weight_sum
                        } else {
                            center_color
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        self.colors = smoothed;
    }
}

fn gaussian(x: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return if x == 0.0 { 1.0 } else { 0.0 };
    }
    (-x * x / (2.0 * sigma * sigma)).exp() / (2.0 * std::f64::consts::PI * sigma * sigma).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_grid_spans_whole_output() {
        let grid = SuperpixelGrid::new(UVec2::new(2, 2), UVec2::new(8, 8), Color::BLACK);
        assert_eq!(grid.len(), 4);
        assert_eq!(grid.positions()[0], DVec2::new(2.0, 2.0));
        assert_eq!(grid.positions()[3], DVec2::new(6.0, 6.0));
    }

    #[test]
    fn regular_region_map_covers_every_input_pixel() {
        let map = regular_region_map(UVec2::new(4, 4), UVec2::new(2, 2));
        assert_eq!(map.len(), 16);
        assert_eq!(map[0], UVec2::new(0, 0));
        assert_eq!(map[15], UVec2::new(1, 1));
    }

    #[test]
    fn weights_renormalize_to_one() {
        let pixels = vec![Color::BLACK; 16];
        let input = LabImage::from_pixels(pixels, UVec2::new(4, 4)).unwrap();
        let weights = WeightMap::uniform(UVec2::new(4, 4));
        let mut grid = SuperpixelGrid::new(UVec2::new(2, 2), UVec2::new(4, 4), Color::BLACK);
        let region_map = regular_region_map(UVec2::new(4, 4), UVec2::new(2, 2));
        grid.update_means(&input, &weights, &region_map);
        let total: f64 = grid.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    /// For a non-square grid/image ratio, an empty superpixel's fallback `y`
    /// must come from `x/size.y*in_size.y`, computed independently of
    /// `fallback_x` — not by reusing `fallback_x`'s raw (pre-clamp) value.
    #[test]
    fn empty_superpixel_fallback_derives_y_independently_of_x() {
        let size = UVec2::new(2, 8);
        let in_size = UVec2::new(4, 32);
        let pixel_count = (in_size.x * in_size.y) as usize;

        // Every input pixel maps to superpixel (0, 0), leaving superpixel
        // (1, 0) — linear index 1 — with no members.
        let region_map = vec![UVec2::new(0, 0); pixel_count];
        let pixels: Vec<Color> = (0..pixel_count)
            .map(|i| Color::new(i as f64, 0.0, 0.0))
            .collect();
        let input = LabImage::from_pixels(pixels, in_size).unwrap();
        let weights = WeightMap::uniform(in_size);
        let mut grid = SuperpixelGrid::new(size, in_size, Color::BLACK);
        grid.update_means(&input, &weights, &region_map);

        // x=1: fallback_x = 1/2*4 = 2, fallback_y = 1/8*32 = 4.
        let bug_formula_color = input[UVec2::new(2, 4)];
        assert_eq!(grid.colors()[1], bug_formula_color);

        // A differently-derived fallback (e.g. reusing fallback_x's raw
        // value, or deriving y from the superpixel's own y-coordinate)
        // lands on a different pixel for this non-square ratio.
        let other_candidate_color = input[UVec2::new(2, 2)];
        assert_ne!(bug_formula_color, other_candidate_color);
    }
}
