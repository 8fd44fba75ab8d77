//! `Engine` — the public entry point tying segmentation, the palette, and
//! history together into the single `iterate()` unit of work.

use glam::UVec2;
use image::RgbImage;
use tracing::{debug, info};

use crate::{
    color::Color,
    constants::{COOLING_FACTOR, INITIAL_TEMPERATURE_SAFETY_FACTOR, PALETTE_ERROR_TOLERANCE, T_FINAL},
    error::{PixelartError, Result},
    eigen,
    history::History,
    image::{LabImage, WeightMap},
    palette::Palette,
    state::State,
    superpixel::{self, SuperpixelGrid},
};

/// The tunable scalar parameters that aren't structural (image, output
/// size, palette size).
#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    pub slic_factor: f64,
    pub sigma_color: f64,
    pub sigma_pos: f64,
    pub smooth_pos: f64,
    pub saturation: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        EngineParams {
            slic_factor: 10.0,
            sigma_color: 20.0,
            sigma_pos: 1.0,
            smooth_pos: 0.4,
            // A neutral default; boosting saturation is left to the caller.
            saturation: 1.0,
        }
    }
}

/// The coupled superpixel-segmentation + palette-learning engine.
pub struct Engine {
    input: LabImage,
    weights: WeightMap,
    palette_target_size: usize,
    params: EngineParams,
    range: f64,

    superpixels: SuperpixelGrid,
    palette: Palette,
    temperature: f64,
    converged: bool,
    iteration: u64,

    history: History,
}

impl Engine {
    /// Construct and fully initialize an engine. Construction always
    /// returns a ready-to-iterate engine — there is no separate
    /// `initialize()` call and thus no uninitialized-state window to misuse
    /// before it.
    pub fn new(input: LabImage, out_size: UVec2, palette_size: usize, params: EngineParams) -> Result<Self> {
        if out_size.x == 0 || out_size.y == 0 {
            return Err(PixelartError::InvalidDimensions(
                "output dimensions must be non-zero".into(),
            ));
        }
        if palette_size < 1 {
            return Err(PixelartError::InvalidDimensions(
                "palette size must be at least 1".into(),
            ));
        }

        let in_size = input.size();
        let weights = WeightMap::uniform(in_size);
        let range = superpixel::search_range(in_size, out_size);

        let region_map0 = superpixel::regular_region_map(in_size, out_size);
        let mean_colors = superpixel::initial_mean_colors(&input, &region_map0, out_size);

        let mut superpixels = SuperpixelGrid::new(out_size, in_size, Color::BLACK);
        superpixels.set_colors(mean_colors.clone());

        let c0 = Color::average(&mean_colors);
        let n_sp = mean_colors.len();
        let uniform_weight = 1.0 / n_sp as f64;
        let weights_for_covariance = vec![uniform_weight; n_sp];
        let covariance = eigen::weighted_abs_outer_product(c0, &mean_colors, &weights_for_covariance);
        let (axis, lambda_max) = eigen::max_eigen(covariance);

        let palette = Palette::seed(c0, axis, n_sp);
        let temperature = INITIAL_TEMPERATURE_SAFETY_FACTOR * (2.0 * lambda_max.max(0.0)).sqrt();

        info!(
            out_width = out_size.x,
            out_height = out_size.y,
            palette_size,
            initial_temperature = temperature,
            "engine initialized"
        );

        Ok(Engine {
            input,
            weights,
            palette_target_size: palette_size,
            params,
            range,
            superpixels,
            palette,
            temperature,
            converged: false,
            iteration: 0,
            history: History::new(),
        })
    }

    /// Reconstruct an engine directly from a [`crate::project::ProjectFile`]'s
    /// decomposed fields, forcing `converged = true` and `T = T_FINAL` so a
    /// reloaded project never resumes active annealing by surprise.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        input: LabImage,
        weights: WeightMap,
        out_size: UVec2,
        palette_target_size: usize,
        params: EngineParams,
        positions: Vec<glam::DVec2>,
        mean_colors: Vec<Color>,
        palette_colors: Vec<Color>,
        assignment: Vec<usize>,
        priors: Vec<f64>,
        locks: Vec<bool>,
        constraints: Vec<Vec<usize>>,
        pairs: Option<Vec<(usize, usize)>>,
        iteration: u64,
    ) -> Result<Self> {
        let in_size = input.size();
        let range = superpixel::search_range(in_size, out_size);

        let mut superpixels = SuperpixelGrid::new(out_size, in_size, Color::BLACK);
        superpixels.set_positions(positions);
        superpixels.set_colors(mean_colors);
        let superpixel_count = superpixels.len();

        let palette = Palette::from_state(
            palette_colors,
            pairs,
            priors,
            locks,
            constraints,
            assignment,
            superpixel_count,
        );

        Ok(Engine {
            input,
            weights,
            palette_target_size,
            params,
            range,
            superpixels,
            palette,
            temperature: T_FINAL,
            converged: true,
            iteration,
            history: History::new(),
        })
    }

    pub fn input(&self) -> &LabImage {
        &self.input
    }

    pub fn importance_weights(&self) -> &WeightMap {
        &self.weights
    }

    /// Raw per-input-pixel importance weights in row-major order.
    pub fn importance_weight_values(&self) -> Vec<f64> {
        let size = self.input.size();
        (0..size.y)
            .flat_map(|y| (0..size.x).map(move |x| UVec2::new(x, y)))
            .map(|coord| self.weights[coord])
            .collect()
    }

    pub fn superpixel_grid_size(&self) -> UVec2 {
        self.superpixels.size()
    }

    pub fn palette_target_size(&self) -> usize {
        self.palette_target_size
    }

    pub fn params(&self) -> EngineParams {
        self.params
    }

    pub fn superpixel_positions(&self) -> &[glam::DVec2] {
        self.superpixels.positions()
    }

    pub fn superpixel_mean_colors(&self) -> &[Color] {
        self.superpixels.colors()
    }

    pub fn palette_assignment(&self) -> &[usize] {
        self.palette.assignment()
    }

    pub fn palette_colors(&self) -> &[Color] {
        self.palette.colors()
    }

    pub fn palette_priors(&self) -> &[f64] {
        self.palette.priors()
    }

    pub fn palette_locks(&self) -> &[bool] {
        self.palette.locks()
    }

    pub fn palette_constraints(&self) -> &[Vec<usize>] {
        self.palette.constraints()
    }

    pub fn palette_pairs(&self) -> Option<&[(usize, usize)]> {
        self.palette.pairs()
    }

    pub fn set_importance_weights(&mut self, weights: WeightMap) -> Result<()> {
        if weights.size() != self.input.size() {
            return Err(PixelartError::ShapeMismatch(format!(
                "importance weights must be {}x{}, got {}x{}",
                self.input.size().x,
                self.input.size().y,
                weights.size().x,
                weights.size().y
            )));
        }
        self.weights = weights;
        Ok(())
    }

    pub fn set_slic_factor(&mut self, value: f64) {
        self.params.slic_factor = value;
    }

    pub fn set_sigma_color(&mut self, value: f64) {
        self.params.sigma_color = value;
    }

    pub fn set_sigma_pos(&mut self, value: f64) {
        self.params.sigma_pos = value;
    }

    pub fn set_smooth_pos(&mut self, value: f64) {
        self.params.smooth_pos = value;
    }

    pub fn set_saturation(&mut self, value: f64) {
        self.params.saturation = value;
    }

    pub fn has_converged(&self) -> bool {
        self.converged
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Perform one full pipeline pass. A no-op once converged.
    pub fn iterate(&mut self) {
        if self.converged {
            return;
        }

        let averaged = self.palette.averaged_palette_by_raw_index();
        let region_map = self.superpixels.update_mapping(
            &self.input,
            &averaged,
            self.palette.assignment(),
            self.params.slic_factor,
            self.range,
        );
        self.superpixels.update_means(&self.input, &self.weights, &region_map);
        self.superpixels.smooth_positions(self.params.smooth_pos);
        self.superpixels.smooth_colors(self.params.sigma_color, self.params.sigma_pos);

        self.palette
            .associate(self.superpixels.colors(), self.superpixels.weights(), self.temperature);
        let err = self.palette.refine(self.superpixels.colors(), self.superpixels.weights());

        debug!(
            iteration = self.iteration,
            temperature = self.temperature,
            palette_error = err,
            raw_palette_size = self.palette.raw_len(),
            "iterate"
        );

        if err < PALETTE_ERROR_TOLERANCE {
            if self.temperature <= T_FINAL {
                self.converged = true;
                info!(iteration = self.iteration, "converged");
            } else {
                self.temperature = (self.temperature * COOLING_FACTOR).max(T_FINAL);
            }
            self.palette.expand(self.superpixels.colors(), self.palette_target_size);
        }

        self.iteration += 1;
    }

    /// `w×h` 8-bit RGB: each superpixel's averaged-palette color, saturated
    /// and converted Lab→sRGB.
    pub fn get_output_image(&self) -> RgbImage {
        let out_size = self.superpixels.size();
        let averaged = self.palette.averaged_palette_by_raw_index();
        let mut img = RgbImage::new(out_size.x, out_size.y);

        for (s, &raw_index) in self.palette.assignment().iter().enumerate() {
            let x = s as u32 % out_size.x;
            let y = s as u32 / out_size.x;
            let rgb = averaged[raw_index].saturated(self.params.saturation).to_rgb8();
            img.put_pixel(x, y, image::Rgb(rgb));
        }

        img
    }

    /// The effective (user-visible) palette, saturated and converted to RGB.
    pub fn get_palette(&self) -> Vec<[u8; 3]> {
        self.palette
            .averaged_palette()
            .into_iter()
            .map(|c| c.saturated(self.params.saturation).to_rgb8())
            .collect()
    }

    pub fn set_color(&mut self, effective_index: usize, color: Color) -> Result<()> {
        let size = self.palette.effective_len();
        if effective_index >= size {
            return Err(PixelartError::PaletteIndexOutOfRange {
                index: effective_index,
                size,
            });
        }
        self.palette.set_effective_color(effective_index, color);
        self.converged = false;
        Ok(())
    }

    pub fn set_color_from_superpixel(&mut self, effective_index: usize, superpixel: usize) -> Result<()> {
        let size = self.palette.effective_len();
        if effective_index >= size {
            return Err(PixelartError::PaletteIndexOutOfRange {
                index: effective_index,
                size,
            });
        }
        if superpixel >= self.superpixels.len() {
            return Err(PixelartError::ShapeMismatch(format!(
                "superpixel index {superpixel} out of range (have {})",
                self.superpixels.len()
            )));
        }
        let color = self.superpixels.colors()[superpixel];
        self.palette.set_effective_color(effective_index, color);
        self.converged = false;
        Ok(())
    }

    pub fn set_color_lock(&mut self, effective_index: usize, locked: bool) -> Result<()> {
        let size = self.palette.effective_len();
        if effective_index >= size {
            return Err(PixelartError::PaletteIndexOutOfRange {
                index: effective_index,
                size,
            });
        }
        self.palette.set_effective_lock(effective_index, locked);
        self.converged = false;
        Ok(())
    }

    /// Restrict superpixel `superpixel`'s soft association to `indices`
    /// (raw subcluster indices); an empty list clears the restriction.
    pub fn set_pixel_constraints(&mut self, superpixel: usize, indices: Vec<usize>) -> Result<()> {
        if superpixel >= self.superpixels.len() {
            return Err(PixelartError::ShapeMismatch(format!(
                "superpixel index {superpixel} out of range (have {})",
                self.superpixels.len()
            )));
        }
        for &index in &indices {
            if index >= self.palette.raw_len() {
                return Err(PixelartError::ShapeMismatch(format!(
                    "constraint index {index} out of palette range (have {})",
                    self.palette.raw_len()
                )));
            }
        }
        self.palette.set_constraint(superpixel, indices);
        self.converged = false;
        Ok(())
    }

    /// Discard forward history, push a deep copy of the current state.
    pub fn snapshot(&mut self) {
        let state = State {
            positions: self.superpixels.positions().to_vec(),
            mean_colors: self.superpixels.colors().to_vec(),
            assignment: self.palette.assignment().to_vec(),
            palette_colors: self.palette.colors().to_vec(),
            priors: self.palette.priors().to_vec(),
            locks: self.palette.locks().to_vec(),
            constraints: self.palette.constraints().to_vec(),
            pairs: self.palette.pairs().map(|p| p.to_vec()),
            iteration: self.iteration,
            saturation: self.params.saturation,
        };
        self.history.snapshot(state);
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo().cloned() {
            Some(state) => {
                self.restore(state);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo().cloned() {
            Some(state) => {
                self.restore(state);
                true
            }
            None => false,
        }
    }

    fn restore(&mut self, state: State) {
        self.superpixels.set_positions(state.positions);
        self.superpixels.set_colors(state.mean_colors);
        self.palette = Palette::from_state(
            state.palette_colors,
            state.pairs,
            state.priors,
            state.locks,
            state.constraints,
            state.assignment,
            self.superpixels.len(),
        );
        self.iteration = state.iteration;
        self.params.saturation = state.saturation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_engine(l: f64, size: UVec2, out_size: UVec2, palette_size: usize) -> Engine {
        let pixels = vec![Color::new(l, 0.0, 0.0); (size.x * size.y) as usize];
        let input = LabImage::from_pixels(pixels, size).unwrap();
        Engine::new(input, out_size, palette_size, EngineParams::default()).unwrap()
    }

    #[test]
    fn rejects_zero_output_dimensions() {
        let pixels = vec![Color::BLACK; 16];
        let input = LabImage::from_pixels(pixels, UVec2::new(4, 4)).unwrap();
        let err = Engine::new(input, UVec2::new(0, 2), 2, EngineParams::default()).unwrap_err();
        assert!(matches!(err, PixelartError::InvalidDimensions(_)));
    }

    #[test]
    fn rejects_zero_palette_size() {
        let pixels = vec![Color::BLACK; 16];
        let input = LabImage::from_pixels(pixels, UVec2::new(4, 4)).unwrap();
        let err = Engine::new(input, UVec2::new(2, 2), 0, EngineParams::default()).unwrap_err();
        assert!(matches!(err, PixelartError::InvalidDimensions(_)));
    }

    #[test]
    fn converged_iterate_is_a_no_op() {
        let mut engine = uniform_engine(50.0, UVec2::new(16, 16), UVec2::new(4, 4), 4);
        for _ in 0..256 {
            if engine.has_converged() {
                break;
            }
            engine.iterate();
        }
        assert!(engine.has_converged());
        let iteration_before = engine.iteration();
        engine.iterate();
        assert_eq!(engine.iteration(), iteration_before);
    }

    #[test]
    fn set_color_out_of_range_is_rejected() {
        let mut engine = uniform_engine(50.0, UVec2::new(8, 8), UVec2::new(2, 2), 2);
        let size = engine.palette.effective_len();
        let err = engine.set_color(size + 1, Color::BLACK).unwrap_err();
        assert!(matches!(err, PixelartError::PaletteIndexOutOfRange { .. }));
    }

    #[test]
    fn pixel_constraint_out_of_palette_range_is_rejected() {
        let mut engine = uniform_engine(50.0, UVec2::new(8, 8), UVec2::new(2, 2), 2);
        let raw_len = engine.palette.raw_len();
        let err = engine.set_pixel_constraints(0, vec![raw_len + 5]).unwrap_err();
        assert!(matches!(err, PixelartError::ShapeMismatch(_)));
    }

    #[test]
    fn undo_restores_prior_iteration_count() {
        let mut engine = uniform_engine(50.0, UVec2::new(16, 16), UVec2::new(4, 4), 4);
        engine.snapshot();
        engine.iterate();
        engine.iterate();
        engine.snapshot();
        assert!(engine.undo());
        assert_eq!(engine.iteration(), 0);
    }
}
